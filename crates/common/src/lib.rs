//! Parade Common - Shared types and traits
//!
//! This crate provides the report model, run configuration, error taxonomy
//! and collaborator traits used across the Parade audit pipeline.

pub mod error;
pub mod report;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{AuditError, ConfigError, DiscoveryError, ParadeResult, RunError, SinkError};
pub use report::{derive_columns, row_values, AuditReport, Column, ColumnField};
pub use traits::{Discovery, OutputWriter};
pub use types::{
    default_concurrency, AuditSettings, FormFactor, OutputTarget, RunInfo, RunOptions, RunSummary,
    RunVersions, SinkFailurePolicy, SystemInfo, UrlState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
