//! redb table definitions for the scaleprobe state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Capacity units keyed by unit name.
pub const UNITS: TableDefinition<&str, &[u8]> = TableDefinition::new("units");

/// Workload units keyed by workload name.
pub const WORKLOAD: TableDefinition<&str, &[u8]> = TableDefinition::new("workload");

/// Latest placement-failure event keyed by the workload name it describes.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
