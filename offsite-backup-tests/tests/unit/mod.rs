//! Unit tests for offsite-backup
//!
//! Pure logic: run stamps, retention over a real directory tree and
//! configuration resolution.

mod retention;
