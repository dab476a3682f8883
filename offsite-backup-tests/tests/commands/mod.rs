//! Command tests for offsite-backup
//!
//! Full runs and prune passes against mocked external programs.

mod notify;
mod prune;
mod run;
mod setup_cron;
