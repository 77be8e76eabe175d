//! SQLite schema for the quarry field store

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Item rows: identity, template, branch, timestamps
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    template_id TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_template ON items(template_id);

-- Shared fields: one value per item
CREATE TABLE IF NOT EXISTS shared_fields (
    item_id TEXT NOT NULL,
    field_id TEXT NOT NULL,
    value TEXT NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    PRIMARY KEY (item_id, field_id)
);

CREATE INDEX IF NOT EXISTS idx_shared_fields_value ON shared_fields(value);

-- Unversioned fields: one value per item and language
CREATE TABLE IF NOT EXISTS unversioned_fields (
    item_id TEXT NOT NULL,
    language TEXT NOT NULL,
    field_id TEXT NOT NULL,
    value TEXT NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    PRIMARY KEY (item_id, language, field_id)
);

-- Versioned fields: one value per item, language and version
CREATE TABLE IF NOT EXISTS versioned_fields (
    item_id TEXT NOT NULL,
    language TEXT NOT NULL,
    version INTEGER NOT NULL,
    field_id TEXT NOT NULL,
    value TEXT NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    PRIMARY KEY (item_id, language, version, field_id)
);

CREATE INDEX IF NOT EXISTS idx_versioned_fields_value ON versioned_fields(value);

-- Archived fields: historical storage, read-only to the save path
CREATE TABLE IF NOT EXISTS archived_fields (
    archival_id TEXT NOT NULL,
    field_id TEXT NOT NULL,
    value TEXT NOT NULL,
    archived TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archived_fields_value ON archived_fields(value);

-- Blob streams, addressed by blob id
CREATE TABLE IF NOT EXISTS blobs (
    blob_id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    created TEXT NOT NULL
);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // Add migrations here as the schema evolves
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_field_tables() {
        let sql = Schema::create_tables();
        for table in [
            "items",
            "shared_fields",
            "unversioned_fields",
            "versioned_fields",
            "archived_fields",
            "blobs",
        ] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table {}",
                table
            );
        }
    }
}
