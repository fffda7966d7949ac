//! Single-diagram rendering.
//!
//! [`Renderer`] runs the full sequence for one diagram:
//! 1. Assemble a standalone document from the diagram body
//! 2. Create a scratch workspace
//! 3. Compile with the typesetting engine (non-interactive, halt on error)
//! 4. Rasterize the resulting PDF page at the requested resolution
//! 5. Publish the image as `<identifier>.<ext>` in the output directory
//!
//! The scratch workspace is removed on every exit path. Publishing goes
//! through a staged file in the output directory and an atomic rename, so a
//! failed render never leaves a partial image behind.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consts::{
    DEFAULT_COMPILE_TIMEOUT, DEFAULT_CONVERT_TIMEOUT, DEFAULT_LOG_TAIL_LINES, SCRATCH_STEM,
};
use crate::error::{RenderError, RenderErrorKind};
use crate::format::ImageFormat;
use crate::scratch::ScratchDir;
use crate::template::StandaloneTemplate;
use crate::toolchain::{ToolCommand, log_tail, run_tool};

/// A published image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    /// Path of the image inside the output directory.
    pub path: PathBuf,
    /// Size of the published file in bytes.
    pub bytes: u64,
}

/// Renders one diagram body to a raster image.
///
/// # Configuration
///
/// Create the renderer with [`Renderer::new`] (`pdflatex` + `pdftoppm`, PNG),
/// then configure using builder methods:
/// - [`compiler`](Self::compiler) / [`rasterizer`](Self::rasterizer): tool commands
/// - [`compile_timeout`](Self::compile_timeout) / [`convert_timeout`](Self::convert_timeout)
/// - [`format`](Self::format): PNG or JPEG output
/// - [`template`](Self::template): standalone preamble
/// - [`scratch_root`](Self::scratch_root): parent of scratch workspaces
/// - [`log_tail_lines`](Self::log_tail_lines): lines kept from failing tools
///
/// # Example
///
/// ```ignore
/// use std::path::Path;
/// use texfig_render::{ImageFormat, Renderer};
///
/// let renderer = Renderer::new().format(ImageFormat::Png);
/// let ok = renderer
///     .render("alpha", r"\begin{tikzpicture}\draw (0,0) -- (1,1);\end{tikzpicture}", Path::new("figures"), 300)
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct Renderer {
    compiler: ToolCommand,
    rasterizer: ToolCommand,
    compile_timeout: Duration,
    convert_timeout: Duration,
    log_tail_lines: usize,
    scratch_root: Option<PathBuf>,
    format: ImageFormat,
    template: StandaloneTemplate,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Create a renderer using `pdflatex` and `pdftoppm` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compiler: ToolCommand::new("pdflatex"),
            rasterizer: ToolCommand::new("pdftoppm"),
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            convert_timeout: DEFAULT_CONVERT_TIMEOUT,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
            scratch_root: None,
            format: ImageFormat::default(),
            template: StandaloneTemplate::default(),
        }
    }

    /// Set the typesetting engine command.
    #[must_use]
    pub fn compiler(mut self, compiler: ToolCommand) -> Self {
        self.compiler = compiler;
        self
    }

    /// Set the PDF-to-raster command (must accept `pdftoppm` arguments).
    #[must_use]
    pub fn rasterizer(mut self, rasterizer: ToolCommand) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Set the wall-clock limit for compilation.
    ///
    /// Default is 60 seconds.
    #[must_use]
    pub fn compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    /// Set the wall-clock limit for rasterization.
    ///
    /// Default is 30 seconds.
    #[must_use]
    pub fn convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = timeout;
        self
    }

    /// Set how many trailing tool output lines a failure keeps.
    #[must_use]
    pub fn log_tail_lines(mut self, lines: usize) -> Self {
        self.log_tail_lines = lines;
        self
    }

    /// Create scratch workspaces under `root` instead of the system temp dir.
    #[must_use]
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Set the output image format.
    #[must_use]
    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the standalone document template.
    #[must_use]
    pub fn template(mut self, template: StandaloneTemplate) -> Self {
        self.template = template;
        self
    }

    /// Output filename for an identifier.
    #[must_use]
    pub fn output_file_name(&self, identifier: &str) -> String {
        format!("{identifier}.{}", self.format.extension())
    }

    /// Render a diagram, returning whether an image was published.
    ///
    /// Never fails past this boundary: errors are logged by
    /// [`try_render`](Self::try_render) and turned into `false`.
    pub async fn render(&self, identifier: &str, body: &str, output_dir: &Path, dpi: u32) -> bool {
        self.try_render(identifier, body, output_dir, dpi).await.is_ok()
    }

    /// Render a diagram and publish it as `<identifier>.<ext>` in `output_dir`.
    ///
    /// `output_dir` must already exist. Outcomes are logged: success at info
    /// level with the published size, failure at error level with the tool
    /// output tail.
    pub async fn try_render(
        &self,
        identifier: &str,
        body: &str,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<RenderedImage, RenderError> {
        let result = self.render_scoped(identifier, body, output_dir, dpi).await;

        match &result {
            Ok(image) => tracing::info!(
                identifier,
                path = %image.path.display(),
                kb = image.bytes.div_ceil(1024),
                "Rendered diagram"
            ),
            Err(kind) => tracing::error!(
                identifier,
                class = %kind.class(),
                error = %kind,
                log_tail = ?kind.log_tail(),
                "Failed to render diagram"
            ),
        }

        result.map_err(|kind| RenderError {
            identifier: identifier.to_owned(),
            kind,
        })
    }

    /// Run the render inside a scratch workspace and remove it afterwards.
    async fn render_scoped(
        &self,
        identifier: &str,
        body: &str,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<RenderedImage, RenderErrorKind> {
        let scratch = ScratchDir::create(self.scratch_root.as_deref()).map_err(|e| {
            RenderErrorKind::Io(format!("failed to create scratch workspace: {e}"))
        })?;

        let result = self
            .render_in(scratch.path(), identifier, body, output_dir, dpi)
            .await;

        let scratch_path = scratch.path().to_path_buf();
        match (result, scratch.close()) {
            (Ok(image), Ok(())) => Ok(image),
            (Ok(_), Err(e)) => Err(RenderErrorKind::Io(format!(
                "failed to remove scratch workspace {}: {e}",
                scratch_path.display()
            ))),
            (Err(kind), Err(e)) => {
                tracing::warn!(
                    path = %scratch_path.display(),
                    error = %e,
                    "Failed to remove scratch workspace"
                );
                Err(kind)
            }
            (Err(kind), Ok(())) => Err(kind),
        }
    }

    async fn render_in(
        &self,
        workspace: &Path,
        identifier: &str,
        body: &str,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<RenderedImage, RenderErrorKind> {
        let tex_name = format!("{SCRATCH_STEM}.tex");
        tokio::fs::write(workspace.join(&tex_name), self.template.assemble(body))
            .await
            .map_err(|e| RenderErrorKind::Io(format!("failed to write {tex_name}: {e}")))?;

        self.compile(workspace, &tex_name).await?;

        let pdf_name = format!("{SCRATCH_STEM}.pdf");
        if !workspace.join(&pdf_name).is_file() {
            return Err(RenderErrorKind::Conversion {
                reason: format!(
                    "{} reported success but produced no {pdf_name}",
                    self.compiler.program()
                ),
                log_tail: Vec::new(),
            });
        }

        let raster = self.rasterize(workspace, &pdf_name, dpi).await?;

        let destination = output_dir.join(self.output_file_name(identifier));
        publish(raster, destination).await
    }

    /// Compile the assembled document.
    async fn compile(&self, workspace: &Path, tex_name: &str) -> Result<(), RenderErrorKind> {
        let args = ["-interaction=nonstopmode", "-halt-on-error", tex_name];
        let output = run_tool(&self.compiler, &args, workspace, self.compile_timeout)
            .await
            .map_err(|failure| RenderErrorKind::Compilation {
                reason: failure.to_string(),
                log_tail: log_tail(failure.output(), self.log_tail_lines),
            })?;

        if !output.status.success() {
            return Err(RenderErrorKind::Compilation {
                reason: format!("{} exited with {}", self.compiler.program(), output.status),
                log_tail: log_tail(&output.combined(), self.log_tail_lines),
            });
        }
        Ok(())
    }

    /// Convert the compiled page to a raster image and return its path.
    async fn rasterize(
        &self,
        workspace: &Path,
        pdf_name: &str,
        dpi: u32,
    ) -> Result<PathBuf, RenderErrorKind> {
        let dpi = dpi.to_string();
        let args = [
            self.format.rasterizer_flag(),
            "-r",
            dpi.as_str(),
            "-singlefile",
            pdf_name,
            SCRATCH_STEM,
        ];
        let output = run_tool(&self.rasterizer, &args, workspace, self.convert_timeout)
            .await
            .map_err(|failure| RenderErrorKind::Conversion {
                reason: failure.to_string(),
                log_tail: log_tail(failure.output(), self.log_tail_lines),
            })?;

        if !output.status.success() {
            return Err(RenderErrorKind::Conversion {
                reason: format!(
                    "{} exited with {}",
                    self.rasterizer.program(),
                    output.status
                ),
                log_tail: log_tail(&output.combined(), self.log_tail_lines),
            });
        }

        let raster_name = format!("{SCRATCH_STEM}.{}", self.format.extension());
        let raster = workspace.join(&raster_name);
        if !raster.is_file() {
            return Err(RenderErrorKind::Conversion {
                reason: format!(
                    "{} reported success but produced no {raster_name}",
                    self.rasterizer.program()
                ),
                log_tail: log_tail(&output.combined(), self.log_tail_lines),
            });
        }
        Ok(raster)
    }
}

/// Copy `raster` to `destination`, replacing any existing file atomically.
async fn publish(raster: PathBuf, destination: PathBuf) -> Result<RenderedImage, RenderErrorKind> {
    tokio::task::spawn_blocking(move || publish_blocking(&raster, destination))
        .await
        .map_err(|e| RenderErrorKind::Io(format!("publish task failed: {e}")))?
}

fn publish_blocking(raster: &Path, destination: PathBuf) -> Result<RenderedImage, RenderErrorKind> {
    let io_error = |action: &str, e: &dyn std::fmt::Display| {
        RenderErrorKind::Io(format!("failed to {action} {}: {e}", destination.display()))
    };
    let output_dir = destination.parent().unwrap_or(Path::new("."));

    let mut source = File::open(raster).map_err(|e| io_error("read raster for", &e))?;
    let permissions = source
        .metadata()
        .map_err(|e| io_error("read raster for", &e))?
        .permissions();

    // Staged next to the destination so the final rename stays on one filesystem
    let mut staged = tempfile::Builder::new()
        .prefix(".texfig-")
        .suffix(".partial")
        .permissions(permissions)
        .tempfile_in(output_dir)
        .map_err(|e| io_error("stage", &e))?;
    std::io::copy(&mut source, staged.as_file_mut()).map_err(|e| io_error("copy", &e))?;

    staged
        .persist(&destination)
        .map_err(|e| io_error("publish", &e.error))?;

    let bytes = std::fs::metadata(&destination)
        .map_err(|e| io_error("stat", &e))?
        .len();
    Ok(RenderedImage {
        path: destination,
        bytes,
    })
}
