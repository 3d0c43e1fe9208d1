// ABOUTME: Loads and validates config.yaml
// ABOUTME: Mirrors modules/config_loader.py's required-section validation

use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Connection parameters for one side of the comparison.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub dsn: String,
}

impl DbConfig {
    /// Resolve the password, preferring the YAML value but falling back to
    /// `{SOURCE,TARGET}_DB_PASSWORD` the way the reference tool lets
    /// environment variables back-fill connection secrets.
    pub fn resolve_password(&self, env_var: &str) -> Result<String, EngineError> {
        if let Some(p) = &self.password {
            return Ok(p.clone());
        }
        std::env::var(env_var).map_err(|_| {
            EngineError::Config(format!(
                "password for {} not set in config.yaml and {} is not set",
                self.dsn, env_var
            ))
        })
    }

    /// Build a `postgres://` connection string from the parsed parts.
    pub fn connection_string(&self, password: &str) -> String {
        format!("postgresql://{}:{}@{}", self.user, password, self.dsn)
    }
}

/// Declarative description of one table comparison.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSpec {
    pub schema: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub exclude_columns: Vec<String>,
}

fn default_chunk_size() -> usize {
    1000
}

impl TableSpec {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.primary_key.is_empty() {
            return Err(EngineError::Config(format!(
                "table {} has an empty primary_key list",
                self.qualified_name()
            )));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::Config(format!(
                "table {} has chunk_size 0, must be positive",
                self.qualified_name()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    pub audit_log: String,
    #[serde(default = "default_audit_table")]
    pub audit_table: String,
    #[serde(default = "default_metadata_table")]
    pub metadata_table: String,
    #[serde(default = "default_sql_output_dir")]
    pub sql_output_dir: String,
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

fn default_audit_table() -> String {
    "DB_SENTINEL_AUDIT".to_string()
}

fn default_metadata_table() -> String {
    "DB_SENTINEL_METADATA".to_string()
}

fn default_sql_output_dir() -> String {
    ".".to_string()
}

fn default_report_path() -> String {
    "./comparison_report.csv".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Flags {
    #[serde(default)]
    pub enable_audit_table: bool,
    #[serde(default)]
    pub enable_restart: bool,
    #[serde(default)]
    pub enable_reverification: bool,
    #[serde(default)]
    pub debug: bool,
    /// Restores the historical (defective) reverifier wiring instead of the
    /// corrected `present_in_target` predicate.
    #[serde(default)]
    pub reverify_compat_mode: bool,
}

fn default_max_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source_db: DbConfig,
    pub target_db: DbConfig,
    pub table_config: Vec<TableSpec>,
    pub paths: Paths,
    #[serde(default)]
    pub flags: Flags,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

impl Config {
    /// Load and validate `config.yaml` from `path`.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.table_config.is_empty() {
            return Err(EngineError::Config(
                "table_config must contain at least one table".to_string(),
            ));
        }
        for spec in &self.table_config {
            spec.validate()?;
        }
        if self.max_threads == 0 {
            return Err(EngineError::Config(
                "max_threads must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
