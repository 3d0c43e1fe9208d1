// ABOUTME: Error taxonomy for the reconciliation engine
// ABOUTME: Library-facing errors are typed; main.rs converts to anyhow at the CLI boundary

use thiserror::Error;

/// Errors the engine can raise.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not connect to {role} database: {source}")]
    Connect {
        role: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("schema mismatch in {schema}.{table}: primary key column '{column}' not found in projected columns")]
    SchemaMismatch {
        schema: String,
        table: String,
        column: String,
    },

    #[error("batch {batch_id} of {schema}.{table} failed: {source}")]
    Batch {
        schema: String,
        table: String,
        batch_id: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("reverification failed for {schema}.{table}: {source}")]
    Reverify {
        schema: String,
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to emit SQL for {schema}.{table}: {source}")]
    Emit {
        schema: String,
        table: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
