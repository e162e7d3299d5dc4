//! JSON export and bulk import for the pattern catalog.

use loom_core::{
    join_tag_names, Pattern, PatternDraft, PatternSlot, Profession, SlotDraft, Tag,
};
use loom_storage::{PatternStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "loom-transfer";

/// Flat export envelope: one array field, no pagination.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEnvelope {
    pub patterns: Vec<PatternRecord>,
}

/// One exported pattern with its full tag, slot, and profession sets.
#[derive(Debug, Clone, Serialize)]
pub struct PatternRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub name_template: Option<String>,
    pub main_material_override: Option<String>,
    pub origin_override: Option<String>,
    pub commonality: Option<String>,
    pub value: Option<i64>,
    pub tags: Vec<Tag>,
    pub slots: Vec<PatternSlot>,
    pub professions: Vec<Profession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportPayload {
    #[serde(default)]
    pub patterns: Vec<ImportPatternElement>,
}

/// One element of the import payload's `patterns` array. Every scalar is
/// optional; absent fields import as null, matching the permissive form path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportPatternElement {
    pub name: Option<String>,
    pub description: Option<String>,
    pub commonality: Option<String>,
    pub name_template: Option<String>,
    pub main_material_override: Option<String>,
    pub origin_override: Option<String>,
    pub value: Option<i64>,
    #[serde(default)]
    pub professions: Vec<NameRef>,
    #[serde(default)]
    pub slots: Vec<ImportSlotElement>,
    #[serde(default)]
    pub tags: Vec<NameRef>,
}

/// A by-name reference to a profession or tag.
#[derive(Debug, Clone, Deserialize)]
pub struct NameRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportSlotElement {
    pub name: Option<String>,
    pub required_tag: Option<String>,
    pub description_template: Option<String>,
    pub possible_quirks: Option<String>,
}

/// Structured result of a bulk import. Serializes with exactly the field
/// names the endpoint contract promises.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub state: String,
    pub new_records_count: usize,
    pub missing_professions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid data for patterns")]
    NoPatterns,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Export all patterns, or only those carrying the named tag. An unknown tag
/// name yields an empty envelope rather than an error; an empty filter string
/// is treated as no filter.
pub async fn export_patterns(
    store: &PatternStore,
    tag_filter: Option<&str>,
) -> Result<ExportEnvelope, StoreError> {
    let patterns = match tag_filter.filter(|name| !name.is_empty()) {
        Some(name) => match store.find_tag_by_name(name).await? {
            Some(tag) => store.patterns_for_tag(tag.id).await?,
            None => return Ok(ExportEnvelope { patterns: Vec::new() }),
        },
        None => store.list_all_patterns().await?,
    };

    let mut records = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        records.push(record_for(store, pattern).await?);
    }
    Ok(ExportEnvelope { patterns: records })
}

async fn record_for(store: &PatternStore, pattern: Pattern) -> Result<PatternRecord, StoreError> {
    let tags = store.tags_for_pattern(pattern.id).await?;
    let slots = store.slots_for_pattern(pattern.id).await?;
    let professions = store.professions_for_pattern(pattern.id).await?;
    Ok(PatternRecord {
        id: pattern.id,
        name: pattern.name,
        description: pattern.description,
        name_template: pattern.name_template,
        main_material_override: pattern.main_material_override,
        origin_override: pattern.origin_override,
        commonality: pattern.commonality,
        value: pattern.value,
        tags,
        slots,
        professions,
    })
}

/// Bulk-import patterns from a raw JSON string.
///
/// Every element inserts a brand-new Pattern row, even when a pattern with
/// the same name already exists. Profession references resolve by exact name;
/// unresolvable names are collected (de-duplicated) and reported, never
/// fatal. Tag names are joined back into a comma-separated string and run
/// through the same normalizer as form-based edits, so both entry points
/// resolve tags identically.
///
/// Elements are processed strictly in order with no batch transaction: a
/// storage failure partway through leaves earlier elements committed.
pub async fn import_patterns(
    store: &PatternStore,
    raw_json: &str,
) -> Result<ImportSummary, ImportError> {
    let payload: ImportPayload = serde_json::from_str(raw_json)?;
    if payload.patterns.is_empty() {
        return Err(ImportError::NoPatterns);
    }

    let mut new_records_count = 0usize;
    let mut missing_professions: Vec<String> = Vec::new();

    for element in &payload.patterns {
        let draft = PatternDraft {
            name: element.name.clone().unwrap_or_default(),
            description: element.description.clone(),
            name_template: element.name_template.clone(),
            main_material_override: element.main_material_override.clone(),
            origin_override: element.origin_override.clone(),
            commonality: element.commonality.clone(),
            value: element.value,
        };
        let pattern = store.create_pattern(&draft).await?;

        for profession_ref in &element.professions {
            match store.find_profession_by_name(&profession_ref.name).await? {
                Some(profession) => {
                    store.attach_profession(pattern.id, profession.id).await?;
                }
                None => {
                    if !missing_professions.contains(&profession_ref.name) {
                        missing_professions.push(profession_ref.name.clone());
                    }
                }
            }
        }

        for slot in &element.slots {
            store
                .save_slot(
                    pattern.id,
                    None,
                    &SlotDraft {
                        name: slot.name.clone().unwrap_or_default(),
                        required_tag: slot.required_tag.clone(),
                        description_template: slot.description_template.clone(),
                        possible_quirks: slot.possible_quirks.clone(),
                    },
                )
                .await?;
        }

        if !element.tags.is_empty() {
            let tag_string = join_tag_names(element.tags.iter().map(|t| t.name.as_str()));
            store.update_tags(pattern.id, &tag_string).await?;
        }

        new_records_count += 1;
    }

    info!(
        new_records_count,
        missing = missing_professions.len(),
        "bulk import complete"
    );

    Ok(ImportSummary {
        state: "success".to_string(),
        new_records_count,
        missing_professions,
    })
}
