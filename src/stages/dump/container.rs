use super::{dump_one, dump_path, prepare_sql_dir, DatabaseDump, DumpReport};
use crate::config::ContainerDatabase;
use crate::utils::command::CommandLine;
use crate::utils::executor::CommandExecutor;
use crate::utils::timestamp::RunStamp;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;

/// Dumps configured databases through `docker exec`
pub struct ContainerDump<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
    targets: &'a [ContainerDatabase],
    timeout: Duration,
}

impl<'a, E: CommandExecutor + ?Sized> ContainerDump<'a, E> {
    pub fn new(executor: &'a E, targets: &'a [ContainerDatabase], timeout: Duration) -> Self {
        Self {
            executor,
            targets,
            timeout,
        }
    }
}

/// `docker exec -e MYSQL_PWD <container> mysqldump --no-tablespaces -u <user> <db>`
///
/// `-e MYSQL_PWD` without a value forwards the variable from our environment.
fn dump_command(target: &ContainerDatabase) -> CommandLine {
    CommandLine::new("docker")
        .args(["exec", "-e", "MYSQL_PWD"])
        .arg(target.container.as_str())
        .args(["mysqldump", "--no-tablespaces"])
        .args(["-u", target.user.as_str()])
        .arg(target.name.as_str())
        .env("MYSQL_PWD", target.password.as_str())
}

impl<E: CommandExecutor + ?Sized> DatabaseDump for ContainerDump<'_, E> {
    fn dump_all(&self, sql_dir: &Path, stamp: &RunStamp) -> Result<DumpReport> {
        prepare_sql_dir(sql_dir)?;
        let mut report = DumpReport::default();

        for target in self.targets {
            dump_one(
                self.executor,
                &dump_command(target),
                &target.name,
                dump_path(sql_dir, &target.name, stamp),
                self.timeout,
                &mut report,
            );
        }

        Ok(report)
    }
}
