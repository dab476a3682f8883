//! The steps of a backup run, each usable on its own

pub mod archive;
pub mod dump;
pub mod maintenance;
pub mod retention;
pub mod transfer;

pub use archive::{create_archive, ArchiveOutput};
pub use dump::{dumper_for, DatabaseDump, DumpReport};
pub use retention::{prune, BackupTree, LocalTree, PruneReport, RemoteTree};
