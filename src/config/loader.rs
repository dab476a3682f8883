use super::expand_tilde;
use super::types::*;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Names end up in local paths, remote paths and scp targets unquoted
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != ".."
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("'{}' is required", field)));
    }
    Ok(())
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if !is_safe_name(&config.server.name) {
        return Err(invalid(format!(
            "server.name must be non-empty and use only letters, digits, '-', '_' or '.': {:?}",
            config.server.name
        )));
    }

    validate_remote(&config.remote)?;

    if let Some(ref database) = config.database {
        validate_database(database)?;
    }

    if let Some(ref cm) = config.content_management {
        if cm.web_root.as_os_str().is_empty() {
            return Err(invalid("'content_management.web_root' is required"));
        }
        if cm.occ_path.as_os_str().is_empty() {
            return Err(invalid("'content_management.occ_path' is required"));
        }
        require(&cm.occ_user, "content_management.occ_user")?;
        require(&cm.bandwidth_limit, "content_management.bandwidth_limit")?;
        if !cm.mirror_subdir.is_empty() && !is_safe_name(&cm.mirror_subdir) {
            return Err(invalid(format!(
                "content_management.mirror_subdir must be empty or a plain folder name: {:?}",
                cm.mirror_subdir
            )));
        }
    }

    let notifications = &config.notifications;
    if notifications.telegram_bot_id.is_empty() != notifications.telegram_chat_id.is_empty() {
        return Err(invalid(
            "notifications.telegram_bot_id and notifications.telegram_chat_id must be set together",
        ));
    }

    if config.retention.keep == 0 {
        return Err(invalid("retention.keep must be at least 1"));
    }
    if !is_safe_name(&config.retention.family) {
        return Err(invalid(format!(
            "retention.family is not a plain folder name: {:?}",
            config.retention.family
        )));
    }

    let timeouts = &config.timeouts;
    if [
        timeouts.command_seconds,
        timeouts.transfer_seconds,
        timeouts.mirror_seconds,
        timeouts.http_seconds,
    ]
    .contains(&0)
    {
        return Err(invalid("timeouts must be greater than zero"));
    }

    Ok(())
}

fn validate_remote(remote: &RemoteConfig) -> Result<()> {
    require(&remote.host, "remote.host")?;
    require(&remote.username, "remote.username")?;
    require(&remote.password, "remote.password")?;
    require(&remote.root, "remote.root")?;

    let paths = std::iter::once(&remote.root).chain(remote.destination.iter());
    for path in paths {
        if path.chars().any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '`' | '$' | '\\')) {
            return Err(invalid(format!(
                "remote paths may not contain whitespace, quotes, '$' or '\\': {:?}",
                path
            )));
        }
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<()> {
    match database {
        DatabaseConfig::Direct { username, password, .. } => {
            require(username, "database.username")?;
            require(password, "database.password")?;
        }
        DatabaseConfig::Container { targets } => {
            if targets.is_empty() {
                return Err(invalid("database.targets must list at least one database"));
            }
            for (i, target) in targets.iter().enumerate() {
                require(&target.container, &format!("database.targets[{}].container", i))?;
                require(&target.user, &format!("database.targets[{}].user", i))?;
                require(&target.password, &format!("database.targets[{}].password", i))?;
                if !is_safe_name(&target.name) {
                    return Err(invalid(format!(
                        "database.targets[{}].name is not a valid database name: {:?}",
                        i, target.name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn resolve_local_path(work_dir: &Path, path: &Path) -> PathBuf {
    let path = expand_tilde(path);
    if path.is_absolute() {
        path
    } else {
        work_dir.join(path)
    }
}

/// Lexical form of a path: `.` components dropped, `..` applied
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The staging folders are emptied after every run, so they may not hold or
/// contain anything else.
fn check_staging_dirs(
    work_dir: &Path,
    archive_dir: &Path,
    sql_dir: &Path,
    archived: &[PathBuf],
) -> Result<()> {
    let work_dir = normalize(work_dir);
    let home = dirs::home_dir().map(|h| normalize(&h));
    let archive_dir = normalize(archive_dir);
    let sql_dir = normalize(sql_dir);

    for (field, dir) in [("local.archive_dir", &archive_dir), ("local.sql_dir", &sql_dir)] {
        if dir.parent().is_none() {
            return Err(invalid(format!("{} resolves to the filesystem root", field)));
        }
        if work_dir.starts_with(dir) {
            return Err(invalid(format!(
                "{} ({}) is or contains local.work_dir",
                field,
                dir.display()
            )));
        }
        if home.as_ref().is_some_and(|h| h.starts_with(dir)) {
            return Err(invalid(format!(
                "{} ({}) is or contains the home directory",
                field,
                dir.display()
            )));
        }
        if let Some(source) = archived.iter().find(|a| normalize(a).starts_with(dir)) {
            return Err(invalid(format!(
                "{} ({}) is or contains the archived directory {}",
                field,
                dir.display(),
                source.display()
            )));
        }
    }

    if archive_dir.starts_with(&sql_dir) || sql_dir.starts_with(&archive_dir) {
        return Err(invalid(format!(
            "local.archive_dir ({}) and local.sql_dir ({}) must be separate folders",
            archive_dir.display(),
            sql_dir.display()
        )));
    }
    Ok(())
}

/// Resolve a validated configuration into the immutable options of one run.
///
/// `extra_directories` are appended to the archive list after the configured
/// ones. Fails if nothing at all would be archived.
pub fn resolve_run_config(config: &Config, extra_directories: &[PathBuf]) -> Result<RunConfig> {
    validate_config(config)?;

    let cwd = std::env::current_dir()?;
    let work_dir = cwd.join(expand_tilde(&config.local.work_dir));

    let archive_dir = resolve_local_path(&work_dir, &config.local.archive_dir);
    let sql_dir = resolve_local_path(&work_dir, &config.local.sql_dir);

    let archived: Vec<PathBuf> = config
        .local
        .directories
        .iter()
        .map(|d| expand_tilde(d))
        .chain(extra_directories.iter().cloned())
        .collect();

    if config.database.is_none() && archived.is_empty() {
        return Err(invalid(
            "nothing to archive: configure a database or at least one entry in local.directories",
        ));
    }

    let absolute: Vec<PathBuf> = archived.iter().map(|d| cwd.join(d)).collect();
    check_staging_dirs(&work_dir, &archive_dir, &sql_dir, &absolute)?;

    let mut directories = Vec::new();
    if config.database.is_some() {
        directories.push(sql_dir.clone());
    }
    directories.extend(archived);

    let remote_destination = config
        .remote
        .destination
        .clone()
        .unwrap_or_else(|| format!("{}/{}", config.remote.root.trim_end_matches('/'), config.server.name));

    Ok(RunConfig {
        server_name: config.server.name.clone(),
        archive_dir,
        sql_dir,
        directories,
        remote: config.remote.clone(),
        remote_destination,
        database: config.database.clone(),
        content_management: config.content_management.clone(),
        notifications: config.notifications.clone(),
        retention: config.retention.clone(),
        cleanup: config.cleanup.policy,
        timeouts: config.timeouts.clone(),
    })
}
