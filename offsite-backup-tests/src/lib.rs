//! Test utilities for offsite-backup
//!
//! Shared builders, fixtures and fakes for exercising the backup pipeline
//! without a database server, a backup host or a bot endpoint.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, MockExecutor, RecordingNotifier, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::from_builder(ConfigBuilder::minimal());
//!     let run_config = ctx.run_config();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::TestContext;

// Re-export types from the main crate for convenience
pub use offsite_backup::config::{
    CleanupPolicy, Config, ContainerDatabase, ContentManagementConfig, DatabaseConfig,
    NotificationConfig, RemoteConfig, RetentionConfig, RunConfig,
};
pub use offsite_backup::managers::report::{RunReport, Stage, StageOutcome};
pub use offsite_backup::utils::timestamp::RunStamp;

// Re-export mock implementations from the main crate
pub use offsite_backup::managers::notification::Notifier;
pub use offsite_backup::utils::executor::mock::{CommandCall, MockExecutor, MockResponse};
pub use offsite_backup::utils::executor::CommandExecutor;
