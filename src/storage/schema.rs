//! SQLite schema for the refinement store.
//!
//! Timestamps used for ordering are stored as integer microseconds so that
//! `ORDER BY` is exact; records and packages keep their full JSON body.

/// SQL schema for creating the datasets table.
pub const CREATE_DATASETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    source_type TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    storage_path TEXT NOT NULL DEFAULT '',
    file_count INTEGER NOT NULL DEFAULT 0,
    total_size_bytes INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    license_type TEXT,
    stage TEXT NOT NULL,
    quality_score REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL schema for creating the append-only refinement_records table.
pub const CREATE_REFINEMENT_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS refinement_records (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    aggregate_quality REAL NOT NULL,
    items_processed INTEGER NOT NULL,
    items_passed INTEGER NOT NULL,
    items_rejected INTEGER NOT NULL,
    duplicates_found INTEGER NOT NULL,
    dedup_method TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
)
"#;

/// SQL schema for creating the packages table.
pub const CREATE_PACKAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    record_id TEXT NOT NULL REFERENCES refinement_records(id),
    body TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
)
"#;

/// Index for history lookups.
pub const CREATE_RECORDS_DATASET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_refinement_records_dataset
    ON refinement_records (dataset_id, created_at_us)
"#;

/// Index for package lookups.
pub const CREATE_PACKAGES_DATASET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_packages_dataset
    ON packages (dataset_id, created_at_us)
"#;

/// All schema statements in dependency order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_DATASETS_TABLE,
        CREATE_REFINEMENT_RECORDS_TABLE,
        CREATE_PACKAGES_TABLE,
        CREATE_RECORDS_DATASET_INDEX,
        CREATE_PACKAGES_DATASET_INDEX,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            assert!(statement.contains("IF NOT EXISTS"), "{}", statement);
        }
    }

    #[test]
    fn test_tables_precede_indexes() {
        let statements = all_schema_statements();
        let first_index = statements
            .iter()
            .position(|s| s.contains("CREATE INDEX"))
            .expect("index present");
        assert!(statements[..first_index]
            .iter()
            .all(|s| s.contains("CREATE TABLE")));
    }
}
