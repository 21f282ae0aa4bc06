//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary instance records, keyed by `instance_id`.
    pub const INSTANCES: &str = "instances";

    /// Index: instances ordered for placement, keyed by
    /// `player_count || inverted create_time || instance_id`.
    pub const INSTANCES_BY_LOAD: &str = "instances_by_load";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::INSTANCES, cf::INSTANCES_BY_LOAD]
}
