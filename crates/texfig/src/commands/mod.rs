//! CLI command implementations.

pub(crate) mod list;
pub(crate) mod render;

use std::path::Path;

pub(crate) use list::ListArgs;
pub(crate) use render::RenderArgs;

use crate::error::CliError;

/// Read the whole input document.
fn read_document(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Document {
        path: path.to_path_buf(),
        source,
    })
}
