//! Default limits for external tool invocations.
//!
//! `texfig_config::ToolchainConfig::default` repeats these values so the
//! config crate stays independent of the renderer.

use std::time::Duration;

/// Wall-clock limit for one typesetting run (60 seconds).
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Wall-clock limit for one rasterization run (30 seconds).
pub const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trailing engine output lines kept in a failure report.
pub const DEFAULT_LOG_TAIL_LINES: usize = 30;

/// File stem used for every artifact inside a scratch workspace.
pub(crate) const SCRATCH_STEM: &str = "diagram";
