use super::{dump_one, dump_path, prepare_sql_dir, DatabaseDump, DumpReport};
use crate::utils::command::CommandLine;
use crate::utils::executor::CommandExecutor;
use crate::utils::timestamp::RunStamp;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// Schemas that are never dumped
const SYSTEM_DATABASES: &[&str] = &["information_schema", "performance_schema"];

/// Dumps every database a local server reports
pub struct DirectDump<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
    username: &'a str,
    password: &'a str,
    exclude: &'a [String],
    timeout: Duration,
}

impl<'a, E: CommandExecutor + ?Sized> DirectDump<'a, E> {
    pub fn new(
        executor: &'a E,
        username: &'a str,
        password: &'a str,
        exclude: &'a [String],
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            username,
            password,
            exclude,
            timeout,
        }
    }

    /// Names from `SHOW DATABASES`, minus system schemas and exclusions
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let cmd = CommandLine::new("mysql")
            .args(["--batch", "--skip-column-names"])
            .args(["-u", self.username])
            .args(["-e", "SHOW DATABASES;"])
            .env("MYSQL_PWD", self.password);

        let stdout = self.executor.run_command_stdout(&cmd, Some(self.timeout))?;
        Ok(filter_databases(&stdout, self.exclude))
    }
}

fn filter_databases(listing: &str, exclude: &[String]) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| !SYSTEM_DATABASES.contains(name))
        .filter(|name| !exclude.iter().any(|e| e == name))
        .map(String::from)
        .collect()
}

impl<E: CommandExecutor + ?Sized> DatabaseDump for DirectDump<'_, E> {
    fn dump_all(&self, sql_dir: &Path, stamp: &RunStamp) -> Result<DumpReport> {
        prepare_sql_dir(sql_dir)?;
        let mut report = DumpReport::default();

        let databases = match self.list_databases() {
            Ok(databases) => databases,
            Err(e) => {
                error!("Failed to list databases: {}", e);
                report.enumeration_error = Some(e.to_string());
                return Ok(report);
            }
        };
        info!("Found {} database(s) to dump", databases.len());

        for database in &databases {
            let cmd = CommandLine::new("mysqldump")
                .args(["-u", self.username])
                .arg(database.as_str())
                .env("MYSQL_PWD", self.password);

            dump_one(
                self.executor,
                &cmd,
                database,
                dump_path(sql_dir, database, stamp),
                self.timeout,
                &mut report,
            );
        }

        Ok(report)
    }
}
