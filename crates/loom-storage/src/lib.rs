//! SQLite-backed repository for patterns, slots, tags, and professions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use loom_core::{
    parse_tag_list, reconcile, Pattern, PatternDraft, PatternSlot, Profession, SlotDraft, Tag,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "loom-storage";

/// Fixed page size for pattern listings and search results.
pub const PAGE_SIZE: u32 = 15;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pattern {0} not found")]
    PatternNotFound(Uuid),
    #[error("pattern slot {0} not found")]
    SlotNotFound(Uuid),
    #[error("malformed id stored in database: {0}")]
    MalformedId(#[from] uuid::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// One page of an ordered listing, with enough totals for the boundary layer
/// to render page links.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS patterns (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        description TEXT,
        name_template TEXT,
        main_material_override TEXT,
        origin_override TEXT,
        commonality TEXT,
        value INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pattern_slots (
        id TEXT PRIMARY KEY,
        pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
        name TEXT NOT NULL DEFAULT '',
        required_tag TEXT,
        description_template TEXT,
        possible_quirks TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pattern_slots_pattern ON pattern_slots(pattern_id)",
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS professions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pattern_professions (
        pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
        profession_id TEXT NOT NULL REFERENCES professions(id),
        PRIMARY KEY (pattern_id, profession_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pattern_tags (
        pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (pattern_id, tag_id)
    )
    "#,
];

/// Repository over the catalog's relational store. Cheap to clone; all state
/// lives in the shared connection pool.
#[derive(Debug, Clone)]
pub struct PatternStore {
    pool: SqlitePool,
}

impl PatternStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL, creating the file if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// In-memory store on a single pooled connection, for tests and demos.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create all tables idempotently.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // Pattern repository operations

    /// All patterns ordered by name ascending, paginated at [`PAGE_SIZE`].
    pub async fn list_patterns(&self, page: u32) -> Result<Page<Pattern>, StoreError> {
        self.fetch_pattern_page(None, page).await
    }

    /// Patterns whose name contains `fragment`, ordered by name, paginated.
    /// An empty fragment matches everything and behaves as a plain listing.
    pub async fn search_patterns(
        &self,
        fragment: &str,
        page: u32,
    ) -> Result<Page<Pattern>, StoreError> {
        self.fetch_pattern_page(Some(fragment), page).await
    }

    async fn fetch_pattern_page(
        &self,
        fragment: Option<&str>,
        page: u32,
    ) -> Result<Page<Pattern>, StoreError> {
        let like = fragment.map(|f| format!("%{f}%"));

        let total: i64 = match &like {
            Some(like) => {
                sqlx::query("SELECT COUNT(*) AS n FROM patterns WHERE name LIKE ?")
                    .bind(like)
                    .fetch_one(&self.pool)
                    .await?
                    .get("n")
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM patterns")
                .fetch_one(&self.pool)
                .await?
                .get("n"),
        };

        let total_pages = ((total.max(0) as u32).div_ceil(PAGE_SIZE)).max(1);
        let page = page.clamp(1, total_pages);
        let offset = (page - 1) * PAGE_SIZE;

        let rows = match &like {
            Some(like) => {
                sqlx::query(
                    "SELECT * FROM patterns WHERE name LIKE ? ORDER BY name LIMIT ? OFFSET ?",
                )
                .bind(like)
                .bind(PAGE_SIZE)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM patterns ORDER BY name LIMIT ? OFFSET ?")
                    .bind(PAGE_SIZE)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let items = rows
            .iter()
            .map(pattern_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            page,
            per_page: PAGE_SIZE,
            total_pages,
        })
    }

    pub async fn find_pattern(&self, id: Uuid) -> Result<Pattern, StoreError> {
        let row = sqlx::query("SELECT * FROM patterns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => pattern_from_row(&row),
            None => Err(StoreError::PatternNotFound(id)),
        }
    }

    pub async fn create_pattern(&self, draft: &PatternDraft) -> Result<Pattern, StoreError> {
        let now = Utc::now();
        let pattern = Pattern {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            name_template: draft.name_template.clone(),
            main_material_override: draft.main_material_override.clone(),
            origin_override: draft.origin_override.clone(),
            commonality: draft.commonality.clone(),
            value: draft.value,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO patterns
                (id, name, description, name_template, main_material_override,
                 origin_override, commonality, value, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pattern.id.to_string())
        .bind(&pattern.name)
        .bind(&pattern.description)
        .bind(&pattern.name_template)
        .bind(&pattern.main_material_override)
        .bind(&pattern.origin_override)
        .bind(&pattern.commonality)
        .bind(pattern.value)
        .bind(pattern.created_at)
        .bind(pattern.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(pattern_id = %pattern.id, name = %pattern.name, "created pattern");
        Ok(pattern)
    }

    /// Full-row rewrite of the scalar fields; last writer wins.
    pub async fn update_pattern(
        &self,
        id: Uuid,
        draft: &PatternDraft,
    ) -> Result<Pattern, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE patterns
               SET name = ?, description = ?, name_template = ?,
                   main_material_override = ?, origin_override = ?,
                   commonality = ?, value = ?, updated_at = ?
             WHERE id = ?
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.name_template)
        .bind(&draft.main_material_override)
        .bind(&draft.origin_override)
        .bind(&draft.commonality)
        .bind(draft.value)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PatternNotFound(id));
        }
        self.find_pattern(id).await
    }

    /// Every pattern, ordered by name; export support, no pagination.
    pub async fn list_all_patterns(&self) -> Result<Vec<Pattern>, StoreError> {
        let rows = sqlx::query("SELECT * FROM patterns ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    /// Patterns linked to the given tag, ordered by name.
    pub async fn patterns_for_tag(&self, tag_id: Uuid) -> Result<Vec<Pattern>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.* FROM patterns p
              JOIN pattern_tags pt ON pt.pattern_id = p.id
             WHERE pt.tag_id = ?
             ORDER BY p.name
            "#,
        )
        .bind(tag_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    // Slot operations

    pub async fn find_slot(&self, id: Uuid) -> Result<PatternSlot, StoreError> {
        let row = sqlx::query("SELECT * FROM pattern_slots WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => slot_from_row(&row),
            None => Err(StoreError::SlotNotFound(id)),
        }
    }

    pub async fn slots_for_pattern(&self, pattern_id: Uuid) -> Result<Vec<PatternSlot>, StoreError> {
        let rows = sqlx::query("SELECT * FROM pattern_slots WHERE pattern_id = ? ORDER BY name")
            .bind(pattern_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(slot_from_row).collect()
    }

    /// Insert (`slot_id == None`) or update a slot. The owning `pattern_id`
    /// is written unconditionally, so an edited slot can never be re-parented
    /// by smuggling a different parent through the input.
    pub async fn save_slot(
        &self,
        pattern_id: Uuid,
        slot_id: Option<Uuid>,
        draft: &SlotDraft,
    ) -> Result<PatternSlot, StoreError> {
        let slot = PatternSlot {
            id: slot_id.unwrap_or_else(Uuid::new_v4),
            pattern_id,
            name: draft.name.clone(),
            required_tag: draft.required_tag.clone(),
            description_template: draft.description_template.clone(),
            possible_quirks: draft.possible_quirks.clone(),
        };

        match slot_id {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO pattern_slots
                        (id, pattern_id, name, required_tag, description_template, possible_quirks)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(slot.id.to_string())
                .bind(slot.pattern_id.to_string())
                .bind(&slot.name)
                .bind(&slot.required_tag)
                .bind(&slot.description_template)
                .bind(&slot.possible_quirks)
                .execute(&self.pool)
                .await?;
            }
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    UPDATE pattern_slots
                       SET pattern_id = ?, name = ?, required_tag = ?,
                           description_template = ?, possible_quirks = ?
                     WHERE id = ?
                    "#,
                )
                .bind(slot.pattern_id.to_string())
                .bind(&slot.name)
                .bind(&slot.required_tag)
                .bind(&slot.description_template)
                .bind(&slot.possible_quirks)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::SlotNotFound(id));
                }
            }
        }

        Ok(slot)
    }

    /// Remove every slot owned by the pattern; returns the number deleted.
    pub async fn delete_slots(&self, pattern_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM pattern_slots WHERE pattern_id = ?")
            .bind(pattern_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // Profession association

    /// Seed a reference profession. Professions are managed outside the
    /// pattern surface; nothing in the HTTP layer creates them.
    pub async fn create_profession(&self, name: &str) -> Result<Profession, StoreError> {
        let profession = Profession {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        sqlx::query("INSERT INTO professions (id, name) VALUES (?, ?)")
            .bind(profession.id.to_string())
            .bind(&profession.name)
            .execute(&self.pool)
            .await?;
        Ok(profession)
    }

    pub async fn list_professions(&self) -> Result<Vec<Profession>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM professions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profession_from_row).collect()
    }

    pub async fn find_profession_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Profession>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM professions WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profession_from_row).transpose()
    }

    pub async fn professions_for_pattern(
        &self,
        pattern_id: Uuid,
    ) -> Result<Vec<Profession>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT pr.id, pr.name FROM professions pr
              JOIN pattern_professions pp ON pp.profession_id = pr.id
             WHERE pp.pattern_id = ?
             ORDER BY pr.name
            "#,
        )
        .bind(pattern_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(profession_from_row).collect()
    }

    /// Link a single profession without touching the rest of the set; the
    /// bulk-import path appends resolved professions one at a time.
    pub async fn attach_profession(
        &self,
        pattern_id: Uuid,
        profession_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO pattern_professions (pattern_id, profession_id) VALUES (?, ?)",
        )
        .bind(pattern_id.to_string())
        .bind(profession_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full-replace reconciliation of the pattern's profession set: links not
    /// in `target` are removed, missing ones added, nothing else touched.
    pub async fn sync_professions(
        &self,
        pattern_id: Uuid,
        target: &[Uuid],
    ) -> Result<(), StoreError> {
        let rows = sqlx::query("SELECT profession_id FROM pattern_professions WHERE pattern_id = ?")
            .bind(pattern_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let current = rows
            .iter()
            .map(|row| Uuid::parse_str(row.get::<String, _>("profession_id").as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let (additions, removals) = reconcile(&current, target);
        for profession_id in additions {
            self.attach_profession(pattern_id, profession_id).await?;
        }
        for profession_id in removals {
            sqlx::query(
                "DELETE FROM pattern_professions WHERE pattern_id = ? AND profession_id = ?",
            )
            .bind(pattern_id.to_string())
            .bind(profession_id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // Tag normalizer

    pub async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, StoreError> {
        if let Some(tag) = self.find_tag_by_name(name).await? {
            return Ok(tag);
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        sqlx::query("INSERT INTO tags (id, name) VALUES (?, ?)")
            .bind(tag.id.to_string())
            .bind(&tag.name)
            .execute(&self.pool)
            .await?;
        debug!(tag_id = %tag.id, name = %tag.name, "created tag");
        Ok(tag)
    }

    /// Recompute the pattern's tag links to equal exactly the set named by
    /// the comma-separated `tag_string`, creating tags that do not yet exist.
    /// Normalizing the same string twice leaves the link set unchanged.
    pub async fn update_tags(&self, pattern_id: Uuid, tag_string: &str) -> Result<(), StoreError> {
        let mut target = Vec::new();
        for name in parse_tag_list(tag_string) {
            target.push(self.find_or_create_tag(&name).await?.id);
        }

        let rows = sqlx::query("SELECT tag_id FROM pattern_tags WHERE pattern_id = ?")
            .bind(pattern_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let current = rows
            .iter()
            .map(|row| Uuid::parse_str(row.get::<String, _>("tag_id").as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let (additions, removals) = reconcile(&current, &target);
        for tag_id in additions {
            sqlx::query("INSERT OR IGNORE INTO pattern_tags (pattern_id, tag_id) VALUES (?, ?)")
                .bind(pattern_id.to_string())
                .bind(tag_id.to_string())
                .execute(&self.pool)
                .await?;
        }
        for tag_id in removals {
            sqlx::query("DELETE FROM pattern_tags WHERE pattern_id = ? AND tag_id = ?")
                .bind(pattern_id.to_string())
                .bind(tag_id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Tags in stored (link insertion) order, for stable display strings.
    pub async fn tags_for_pattern(&self, pattern_id: Uuid) -> Result<Vec<Tag>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name FROM tags t
              JOIN pattern_tags pt ON pt.tag_id = t.id
             WHERE pt.pattern_id = ?
             ORDER BY pt.rowid
            "#,
        )
        .bind(pattern_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tag_from_row).collect()
    }

    /// Inverse of [`PatternStore::update_tags`]: the comma-separated display
    /// string used to pre-populate the edit form.
    pub async fn tags_to_string(&self, pattern_id: Uuid) -> Result<String, StoreError> {
        let tags = self.tags_for_pattern(pattern_id).await?;
        Ok(loom_core::join_tag_names(tags.iter().map(|t| t.name.as_str())))
    }
}

fn pattern_from_row(row: &SqliteRow) -> Result<Pattern, StoreError> {
    Ok(Pattern {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
        description: row.get("description"),
        name_template: row.get("name_template"),
        main_material_override: row.get("main_material_override"),
        origin_override: row.get("origin_override"),
        commonality: row.get("commonality"),
        value: row.get("value"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn slot_from_row(row: &SqliteRow) -> Result<PatternSlot, StoreError> {
    Ok(PatternSlot {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        pattern_id: Uuid::parse_str(row.get::<String, _>("pattern_id").as_str())?,
        name: row.get("name"),
        required_tag: row.get("required_tag"),
        description_template: row.get("description_template"),
        possible_quirks: row.get("possible_quirks"),
    })
}

fn tag_from_row(row: &SqliteRow) -> Result<Tag, StoreError> {
    Ok(Tag {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
    })
}

fn profession_from_row(row: &SqliteRow) -> Result<Profession, StoreError> {
    Ok(Profession {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
    })
}
