//! Core domain model and pure association helpers for the Loom pattern catalog.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "loom-core";

/// A crafting/recipe template, the root aggregate of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub name_template: Option<String>,
    pub main_material_override: Option<String>,
    pub origin_override: Option<String>,
    pub commonality: Option<String>,
    pub value: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named component slot belonging to exactly one pattern.
///
/// `required_tag` is a free-text label matched at runtime by downstream
/// consumers; it is never validated against the tags table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSlot {
    pub id: Uuid,
    pub pattern_id: Uuid,
    pub name: String,
    pub required_tag: Option<String>,
    pub description_template: Option<String>,
    pub possible_quirks: Option<String>,
}

/// Free-text label entity, auto-created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// Pre-existing reference entity denoting who can craft a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profession {
    pub id: Uuid,
    pub name: String,
}

/// Scalar input for pattern create/update.
///
/// Fields pass through to the store without validation; an empty `name` is
/// accepted, matching what the persistence layer accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDraft {
    pub name: String,
    pub description: Option<String>,
    pub name_template: Option<String>,
    pub main_material_override: Option<String>,
    pub origin_override: Option<String>,
    pub commonality: Option<String>,
    pub value: Option<i64>,
}

/// Scalar input for slot create/update. The owning pattern id is supplied
/// separately by the caller and always wins over whatever the edited row held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub name: String,
    pub required_tag: Option<String>,
    pub description_template: Option<String>,
    pub possible_quirks: Option<String>,
}

/// Parse a comma-separated, whitespace-tolerant tag string into a list of
/// names: trimmed, empties dropped, de-duplicated preserving first occurrence.
pub fn parse_tag_list(input: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for raw in input.split(',') {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Join tag names into the display string used to pre-populate edit forms.
/// Round-trips through [`parse_tag_list`] to the same set of names.
pub fn join_tag_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Set reconciliation for many-to-many associations: returns
/// `(target − current, current − target)` with duplicates collapsed and input
/// order preserved. Both Tag and Profession sync apply the two halves to get
/// full-replace semantics.
pub fn reconcile<T>(current: &[T], target: &[T]) -> (Vec<T>, Vec<T>)
where
    T: Eq + Hash + Clone,
{
    let current_set: HashSet<&T> = current.iter().collect();
    let target_set: HashSet<&T> = target.iter().collect();

    let mut additions: Vec<T> = Vec::new();
    for item in target {
        if !current_set.contains(item) && !additions.contains(item) {
            additions.push(item.clone());
        }
    }

    let mut removals: Vec<T> = Vec::new();
    for item in current {
        if !target_set.contains(item) && !removals.contains(item) {
            removals.push(item.clone());
        }
    }

    (additions, removals)
}
