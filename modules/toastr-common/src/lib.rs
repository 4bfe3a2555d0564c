pub mod config;

pub use config::{Config, MigrateConfig};

/// Current note-transformation schema version. Publication records carry the
/// version they were published under; the migration routine retracts and
/// republishes anything older.
pub const SCHEMA_VERSION: u32 = 2;

/// Default migration flag written on first publication.
pub const DEFAULT_FLAG: u32 = 0;
