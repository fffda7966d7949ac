//! Per-diagram render errors.

use serde::Serialize;

/// Single diagram rendering error.
#[derive(Debug, thiserror::Error)]
#[error("{identifier}: {kind}")]
pub struct RenderError {
    pub identifier: String,
    pub kind: RenderErrorKind,
}

/// Kind of diagram rendering error.
#[derive(Debug, thiserror::Error)]
pub enum RenderErrorKind {
    /// The typesetting engine rejected the diagram, timed out or could not start.
    #[error("compilation failed: {reason}")]
    Compilation {
        reason: String,
        /// Trailing lines of the engine output.
        log_tail: Vec<String>,
    },
    /// Rasterization failed or an expected artifact was not produced.
    #[error("conversion failed: {reason}")]
    Conversion {
        reason: String,
        /// Trailing lines of the rasterizer output.
        log_tail: Vec<String>,
    },
    /// Workspace, cleanup or publish failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl RenderErrorKind {
    /// Failure class reported to operators.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Compilation { .. } => FailureClass::Compilation,
            Self::Conversion { .. } => FailureClass::Conversion,
            Self::Io(_) => FailureClass::Io,
        }
    }

    /// Tool output captured for triage (empty for I/O errors).
    #[must_use]
    pub fn log_tail(&self) -> &[String] {
        match self {
            Self::Compilation { log_tail, .. } | Self::Conversion { log_tail, .. } => log_tail,
            Self::Io(_) => &[],
        }
    }
}

/// Classification of a failed diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureClass {
    #[serde(rename = "CompilationError")]
    Compilation,
    #[serde(rename = "ConversionError")]
    Conversion,
    #[serde(rename = "IOError")]
    Io,
}

impl FailureClass {
    /// Return class as string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compilation => "CompilationError",
            Self::Conversion => "ConversionError",
            Self::Io => "IOError",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
