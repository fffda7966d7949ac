//! `${VAR}` expansion for paths and tool command lines.
//!
//! `${VAR}` must be set; `${VAR:-default}` falls back to `default`. Bare
//! `$VAR` is left alone so TeX arguments containing `$` pass through.

use std::env::VarError;

use crate::ConfigError;

/// Expand variable references in a single configuration value.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| match std::env::var(var) {
        Ok(found) => Ok(Some(found)),
        Err(VarError::NotPresent) => Err(format!("${{{var}}} not set")),
        Err(VarError::NotUnicode(_)) => Err(format!("${{{var}}} is not valid UTF-8")),
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: e.cause,
    })
}

/// Expand every element of a tool argv in place.
///
/// Errors name the offending element, e.g. `toolchain.compiler[1]`.
pub(crate) fn expand_argv(argv: &mut [String], field: &str) -> Result<(), ConfigError> {
    for (i, part) in argv.iter_mut().enumerate() {
        *part = expand_env(part, &format!("{field}[{i}]"))?;
    }
    Ok(())
}
