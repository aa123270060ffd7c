//! Loads the TOML configuration file the core's [`migra::provider::connect`] and
//! [`migra::coordinator::Coordinator`] are driven from.
//!
//! This lives entirely in the CLI layer (§2 "Out of scope"): the core only ever sees the four
//! recognised options (§6), passed in as plain strings.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_FILE_FORMAT: &str = "{version}-{datetime:%Y%m%d_%H%M%S}-{message}";
pub const DEFAULT_MIGRATION_TABLE: &str = "wd_migrations";
pub const DEFAULT_CONFIG_PATH: &str = "migra.toml";
pub const DEFAULT_MIGRATION_DIR: &str = "migrations";

/// The four recognised options (§6) plus the path they were loaded from, for error messages
/// and for resolving `migration_dir` relative to the config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub dsn: String,
    pub migration_dir: PathBuf,
    pub file_format: String,
    pub migration_table: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    dsn: Option<String>,
    migration_dir: Option<String>,
    file_format: Option<String>,
    migration_table: Option<String>,
}

impl Config {
    /// Loads `config_path` if it exists; otherwise falls back to defaults plus the `--dsn`
    /// override. `dsn_override` — typically `--dsn` or `$DATABASE_URL` — always wins over the
    /// file when given.
    pub fn load(config_path: &Path, dsn_override: Option<String>) -> anyhow::Result<Self> {
        let file = if config_path.exists() {
            let raw = std::fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            let mut expanded = raw.clone();
            expand_env_vars_in_place(&mut expanded)
                .with_context(|| format!("failed to expand config file {}", config_path.display()))?;
            toml::from_str(&expanded)
                .with_context(|| format!("failed to parse config file {}", config_path.display()))?
        } else {
            ConfigFile::default()
        };

        let dsn = dsn_override
            .or(file.dsn)
            .context("dsn is required: pass --dsn, set DATABASE_URL, or add `dsn` to migra.toml")?;

        let config_dir = config_path.parent().filter(|p| !p.as_os_str().is_empty());
        let migration_dir = match file.migration_dir {
            Some(dir) => resolve_relative(config_dir, &dir),
            None => resolve_relative(config_dir, DEFAULT_MIGRATION_DIR),
        };

        Ok(Self {
            config_path: config_path.to_path_buf(),
            dsn,
            migration_dir,
            file_format: file.file_format.unwrap_or_else(|| DEFAULT_FILE_FORMAT.to_string()),
            migration_table: file.migration_table.unwrap_or_else(|| DEFAULT_MIGRATION_TABLE.to_string()),
        })
    }
}

fn resolve_relative(base: Option<&Path>, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base {
        Some(base) => base.join(path),
        None => path.to_path_buf(),
    }
}

/// Expands `${VAR}` references in-place (e.g. `dsn = "${DATABASE_URL}"`), so the dsn need not be
/// committed to the config file.
fn expand_env_vars_in_place(input: &mut String) -> anyhow::Result<()> {
    if !input.contains("${") {
        return Ok(());
    }
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut key = String::new();
            let mut closed = false;
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    closed = true;
                    break;
                }
                key.push(c2);
            }
            if !closed {
                anyhow::bail!("unterminated env var reference: ${{{key}");
            }
            let value = std::env::var(&key)
                .with_context(|| format!("missing env var for config expansion: {key}"))?;
            out.push_str(&value);
            continue;
        }
        out.push(c);
    }

    *input = out;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_file_is_absent() {
        let cfg = Config::load(Path::new("/nonexistent/migra.toml"), Some("sqlite://:memory:".to_string()))
            .unwrap();
        assert_eq!(cfg.dsn, "sqlite://:memory:");
        assert_eq!(cfg.file_format, DEFAULT_FILE_FORMAT);
        assert_eq!(cfg.migration_table, DEFAULT_MIGRATION_TABLE);
    }

    #[test]
    fn missing_dsn_is_an_error() {
        let err = Config::load(Path::new("/nonexistent/migra.toml"), None).unwrap_err();
        assert!(err.to_string().contains("dsn is required"));
    }

    #[test]
    fn env_var_expansion() {
        std::env::set_var("MIGRA_TEST_DSN_EXPANSION", "sqlite://:memory:");
        let mut s = "dsn = \"${MIGRA_TEST_DSN_EXPANSION}\"".to_string();
        expand_env_vars_in_place(&mut s).unwrap();
        assert_eq!(s, "dsn = \"sqlite://:memory:\"");
        std::env::remove_var("MIGRA_TEST_DSN_EXPANSION");
    }
}
