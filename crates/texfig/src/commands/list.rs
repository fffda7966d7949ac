//! `texfig list` command implementation.

use std::path::{Path, PathBuf};

use clap::Args;
use texfig_config::Config;
use texfig_extract::{DiagramUnit, Extraction, find_duplicates, scan};
use texfig_render::ImageFormat;

use super::read_document;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the list command.
#[derive(Args)]
pub(crate) struct ListArgs {
    /// LaTeX document to extract figures from.
    document: PathBuf,

    /// Path to configuration file (default: auto-discover texfig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ListArgs {
    /// Execute the list command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), None)?;
        let document = read_document(&self.document)?;
        let Extraction { units, warnings } = scan(&document);

        for warning in &warnings {
            output.warning(&format!("Skipped {warning}"));
        }

        let extension = ImageFormat::parse(&config.render_resolved.format)
            .unwrap_or_default()
            .extension();
        for unit in &units {
            output.line(&unit_line(unit, &config.render_resolved.output_dir, extension));
        }

        for duplicate in find_duplicates(&units) {
            let lines: Vec<String> = duplicate.lines.iter().map(ToString::to_string).collect();
            output.warning(&format!(
                "Duplicate identifier '{}' at lines {}",
                duplicate.identifier,
                lines.join(", ")
            ));
        }

        output.info(&format!("{} diagram(s) found", units.len()));
        Ok(())
    }
}

fn unit_line(unit: &DiagramUnit, output_dir: &Path, extension: &str) -> String {
    format!(
        "{:>6}  {:<24} {}",
        unit.line(),
        unit.label(),
        output_dir
            .join(format!("{}.{extension}", unit.identifier()))
            .display()
    )
}
