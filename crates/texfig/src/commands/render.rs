//! `texfig render` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use texfig_config::{CliSettings, Config};
use texfig_render::{
    DuplicatePolicy, ImageFormat, Pipeline, RenderError, RenderProgress, RenderedImage, Renderer,
    RunReport, StandaloneTemplate, ToolCommand,
};

use super::read_document;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// LaTeX document to extract figures from.
    document: PathBuf,

    /// Output directory for images (overrides config, default: figures).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Rasterization resolution in dots per inch (overrides config).
    #[arg(long)]
    dpi: Option<u32>,

    /// Maximum number of concurrent renders (overrides config).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Image format: png, jpeg or jpg (overrides config).
    #[arg(long)]
    format: Option<String>,

    /// Path to configuration file (default: auto-discover texfig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a JSON run report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Exit with an error if any diagram fails or is skipped.
    #[arg(long)]
    strict: bool,

    /// Enable verbose output (per-step logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the document cannot be
    /// read, the output directory cannot be created, or `--strict` is set and
    /// the run was incomplete. Individual diagram failures are reported but
    /// are not errors.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            output_dir: self.output_dir,
            dpi: self.dpi,
            format: self.format,
            jobs: self.jobs,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            tracing::info!(path = %path.display(), "Loaded configuration");
        }
        let document = read_document(&self.document)?;

        let render = &config.render_resolved;
        let pipeline = Pipeline::new(renderer_from_config(&config)?)
            .jobs(render.jobs)
            .on_duplicate(duplicate_policy(&render.on_duplicate)?)
            .progress(Arc::new(ProgressOutput::new()));

        let stop = pipeline.stop_handle();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                Output::new().warning("Interrupted, waiting for running diagrams to finish...");
                stop.request_stop();
            }
        });

        output.info(&format!(
            "Rendering {} to {} ({} dpi, {} jobs)",
            self.document.display(),
            render.output_dir.display(),
            render.dpi,
            render.jobs
        ));

        let result = pipeline
            .run(&document, &render.output_dir, render.dpi)
            .await;
        interrupt.abort();
        let report = result?;

        print_summary(&output, &report, &config);

        if let Some(path) = &self.report {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json).map_err(|source| CliError::Report {
                path: path.clone(),
                source,
            })?;
            output.info(&format!("Report written to {}", path.display()));
        }

        if self.strict && !report.is_complete() {
            return Err(CliError::Incomplete {
                failed: report.failed(),
                skipped: report.skipped,
            });
        }
        Ok(())
    }
}

fn print_summary(output: &Output, report: &RunReport, config: &Config) {
    let output_dir = &config.render_resolved.output_dir;
    if report.units.is_empty() {
        output.warning("No labelled tikzpicture figures found");
    }
    if report.skipped > 0 {
        output.warning(&format!(
            "Stopped early: {} diagram(s) not started",
            report.skipped
        ));
    }

    let summary = report.summary_line(output_dir);
    if report.succeeded == report.attempted {
        output.success(&summary);
    } else {
        output.warning(&summary);
    }
}

/// Build a renderer from resolved configuration.
fn renderer_from_config(config: &Config) -> Result<Renderer, CliError> {
    let render = &config.render_resolved;
    let toolchain = &config.toolchain_resolved;

    let format = ImageFormat::parse(&render.format)
        .ok_or_else(|| CliError::Validation(format!("unsupported format '{}'", render.format)))?;
    let compiler = ToolCommand::from_argv(&toolchain.compiler)
        .ok_or_else(|| CliError::Validation("toolchain.compiler is empty".to_owned()))?;
    let rasterizer = ToolCommand::from_argv(&toolchain.rasterizer)
        .ok_or_else(|| CliError::Validation("toolchain.rasterizer is empty".to_owned()))?;

    let mut renderer = Renderer::new()
        .compiler(compiler)
        .rasterizer(rasterizer)
        .compile_timeout(toolchain.compile_timeout)
        .convert_timeout(toolchain.convert_timeout)
        .log_tail_lines(toolchain.log_tail_lines)
        .format(format)
        .template(StandaloneTemplate::new(
            config.template.tikz_libraries.clone(),
            config.template.extra_preamble.clone(),
        ));
    if let Some(scratch_dir) = &toolchain.scratch_dir {
        renderer = renderer.scratch_root(scratch_dir);
    }
    Ok(renderer)
}

fn duplicate_policy(value: &str) -> Result<DuplicatePolicy, CliError> {
    DuplicatePolicy::parse(value)
        .ok_or_else(|| CliError::Validation(format!("unsupported duplicate policy '{value}'")))
}

/// Prints each diagram outcome as soon as it is known.
struct ProgressOutput {
    output: Output,
}

impl ProgressOutput {
    fn new() -> Self {
        Self {
            output: Output::new(),
        }
    }
}

impl RenderProgress for ProgressOutput {
    fn rendered(&self, identifier: &str, image: &RenderedImage) {
        self.output.success(&rendered_line(identifier, image));
    }

    fn failed(&self, error: &RenderError) {
        self.output
            .error_block(&failed_line(error), error.kind.log_tail());
    }
}

fn rendered_line(identifier: &str, image: &RenderedImage) -> String {
    format!(
        "  OK {identifier} -> {} ({} KB)",
        image.path.display(),
        image.bytes.div_ceil(1024)
    )
}

fn failed_line(error: &RenderError) -> String {
    format!(
        "  FAILED {} [{}]: {}",
        error.identifier,
        error.kind.class(),
        error.kind
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use texfig_config::{TemplateConfig, ToolchainConfig};
    use texfig_render::{
        DEFAULT_COMPILE_TIMEOUT, DEFAULT_CONVERT_TIMEOUT, DEFAULT_LOG_TAIL_LINES, RenderErrorKind,
    };

    use super::*;

    fn config_from(toml: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texfig.toml");
        std::fs::write(&path, toml).unwrap();
        Config::load(Some(&path), None).unwrap()
    }

    #[test]
    fn test_rendered_line() {
        let image = RenderedImage {
            path: PathBuf::from("figures/alpha.png"),
            bytes: 1500,
        };
        assert_eq!(
            rendered_line("alpha", &image),
            "  OK alpha -> figures/alpha.png (2 KB)"
        );
    }

    #[test]
    fn test_failed_line() {
        let error = RenderError {
            identifier: "beta".to_owned(),
            kind: RenderErrorKind::Conversion {
                reason: "pdftoppm timed out after 30s".to_owned(),
                log_tail: Vec::new(),
            },
        };
        assert_eq!(
            failed_line(&error),
            "  FAILED beta [ConversionError]: conversion failed: pdftoppm timed out after 30s"
        );
    }

    #[test]
    fn test_duplicate_policy() {
        assert_eq!(duplicate_policy("error").unwrap(), DuplicatePolicy::Error);
        assert!(matches!(
            duplicate_policy("ignore"),
            Err(CliError::Validation(_))
        ));
    }

    #[test]
    fn test_renderer_from_config() {
        let config = config_from(
            r#"
[render]
format = "jpeg"

[toolchain]
compiler = ["lualatex", "-shell-escape"]
compile_timeout_secs = 5
"#,
        );

        let renderer = renderer_from_config(&config).unwrap();

        assert_eq!(renderer.output_file_name("alpha"), "alpha.jpg");
        assert_eq!(config.toolchain_resolved.compile_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_renderer_from_default_config() {
        let config = config_from("");
        let renderer = renderer_from_config(&config).unwrap();
        assert_eq!(renderer.output_file_name("alpha"), "alpha.png");
    }

    #[test]
    fn test_renderer_from_jpg_alias() {
        let config = config_from("[render]\nformat = \"jpg\"\n");
        let renderer = renderer_from_config(&config).unwrap();
        assert_eq!(renderer.output_file_name("alpha"), "alpha.jpg");
    }

    #[test]
    fn test_config_defaults_match_renderer_defaults() {
        let toolchain = ToolchainConfig::default();
        assert_eq!(toolchain.compile_timeout, DEFAULT_COMPILE_TIMEOUT);
        assert_eq!(toolchain.convert_timeout, DEFAULT_CONVERT_TIMEOUT);
        assert_eq!(toolchain.log_tail_lines, DEFAULT_LOG_TAIL_LINES);

        let template = TemplateConfig::default();
        assert_eq!(
            StandaloneTemplate::new(template.tikz_libraries, template.extra_preamble),
            StandaloneTemplate::default()
        );
    }
}
