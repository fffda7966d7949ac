//! CLI error types.

use std::path::PathBuf;

use texfig_config::ConfigError;
use texfig_render::PipelineError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write report {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{failed} diagram(s) failed and {skipped} skipped")]
    Incomplete { failed: usize, skipped: usize },
}
