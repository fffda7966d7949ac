//! Standalone TikZ rendering for texfig.
//!
//! This crate turns extracted diagram units into raster images:
//! - [`Renderer`] compiles one diagram in its own scratch workspace and
//!   rasterizes the resulting page with external tools (`pdflatex`, `pdftoppm`)
//! - [`Pipeline`] extracts every diagram from a document and renders them on a
//!   bounded set of concurrent tasks, collecting a [`RunReport`]
//! - Per-diagram failures are classified ([`FailureClass`]) and never abort
//!   the batch
//!
//! # Architecture
//!
//! The crate is organized into modules:
//! - [`template`]: standalone document assembly
//! - [`scratch`]: scoped temporary workspace with guaranteed removal
//! - [`toolchain`]: external process invocation with timeouts
//! - [`renderer`]: compile, rasterize and publish a single diagram
//! - [`pipeline`]: extraction plus concurrent rendering of a whole document
//! - [`report`]: per-unit outcomes and the run summary
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use texfig_render::{Pipeline, Renderer};
//!
//! let source = std::fs::read_to_string("chapter.tex")?;
//! let pipeline = Pipeline::new(Renderer::new()).jobs(4);
//!
//! let report = pipeline.run(&source, Path::new("figures"), 300).await?;
//! println!("{}", report.summary_line(Path::new("figures")));
//! ```

mod consts;
mod error;
mod format;
pub mod pipeline;
pub mod renderer;
pub mod report;
pub mod scratch;
pub mod template;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod testing;

pub use consts::{DEFAULT_COMPILE_TIMEOUT, DEFAULT_CONVERT_TIMEOUT, DEFAULT_LOG_TAIL_LINES};
pub use error::{FailureClass, RenderError, RenderErrorKind};
pub use format::ImageFormat;
pub use pipeline::{DuplicatePolicy, NullProgress, Pipeline, PipelineError, RenderProgress, StopHandle};
pub use renderer::{RenderedImage, Renderer};
pub use report::{FailureReport, RunReport, UnitReport};
pub use scratch::ScratchDir;
pub use template::StandaloneTemplate;
pub use toolchain::ToolCommand;
