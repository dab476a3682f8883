pub mod command;
pub mod cron;
pub mod locker;
pub mod ssh;
pub mod timestamp;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use command::{CommandError, CommandLine};
pub use executor::{CommandExecutor, RealExecutor};
pub use ssh::{RemoteSession, RemoteTarget, SessionError};
pub use timestamp::RunStamp;
