//! Document-level rendering.
//!
//! [`Pipeline`] extracts every diagram unit from a document and renders them
//! on a bounded number of concurrent tasks. One failing diagram never aborts
//! the batch; each outcome is recorded in the returned [`RunReport`].
//!
//! Units sharing an identifier would write the same output file, so they are
//! rendered sequentially in document order on one task. The last one wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use texfig_extract::{DiagramUnit, UnitStatus, find_duplicates, scan};
use tokio::sync::Semaphore;

use crate::error::{RenderError, RenderErrorKind};
use crate::renderer::{RenderedImage, Renderer};
use crate::report::{RunReport, UnitOutcome};

/// What to do when two diagrams share an identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Log a warning and render all of them; the last one in document order wins.
    #[default]
    Warn,
    /// Refuse to render anything.
    Error,
}

impl DuplicatePolicy {
    /// Parse a policy name (`warn` or `error`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Observer of per-unit progress.
///
/// Called from render tasks as units start and finish. All methods default
/// to no-ops.
pub trait RenderProgress: Send + Sync {
    fn started(&self, _identifier: &str) {}

    fn rendered(&self, _identifier: &str, _image: &RenderedImage) {}

    fn failed(&self, _error: &RenderError) {}
}

/// Progress observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl RenderProgress for NullProgress {}

/// Cooperative cancellation for a running pipeline.
///
/// After [`request_stop`](Self::request_stop) no further unit is started.
/// Renders already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("duplicate diagram identifier '{identifier}' (figures at lines {})", format_lines(.lines))]
    DuplicateIdentifier {
        identifier: String,
        lines: Vec<usize>,
    },
}

fn format_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extracts and renders every diagram of a document.
pub struct Pipeline {
    renderer: Arc<Renderer>,
    jobs: usize,
    on_duplicate: DuplicatePolicy,
    progress: Arc<dyn RenderProgress>,
    stop: StopHandle,
}

impl Pipeline {
    /// Create a pipeline running one render at a time.
    #[must_use]
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
            jobs: 1,
            on_duplicate: DuplicatePolicy::default(),
            progress: Arc::new(NullProgress),
            stop: StopHandle::default(),
        }
    }

    /// Set the maximum number of concurrent renders (at least 1).
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: Arc<dyn RenderProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Handle that stops this pipeline from starting further units.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Extract all diagrams from `document` and render them into `output_dir`.
    ///
    /// The output directory is created if missing. A document without
    /// diagrams yields an empty report.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created or, under
    /// [`DuplicatePolicy::Error`], if two diagrams share an identifier.
    /// Per-diagram failures are reported in the [`RunReport`] instead.
    pub async fn run(
        &self,
        document: &str,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<RunReport, PipelineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let extraction = scan(document);
        for warning in &extraction.warnings {
            tracing::warn!("Skipped {warning}");
        }
        tracing::info!(count = extraction.units.len(), "Extracted diagrams");

        let mut units = extraction.units;
        self.run_units(&mut units, output_dir, dpi).await
    }

    /// Render already extracted units, updating their status.
    ///
    /// `output_dir` must exist.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateIdentifier`] under
    /// [`DuplicatePolicy::Error`] when identifiers collide.
    pub async fn run_units(
        &self,
        units: &mut [DiagramUnit],
        output_dir: &Path,
        dpi: u32,
    ) -> Result<RunReport, PipelineError> {
        if units.is_empty() {
            tracing::info!("No diagrams to render");
            return Ok(RunReport::default());
        }
        self.check_duplicates(units)?;

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::new();
        let mut outcomes: Vec<Option<UnitOutcome>> = units.iter().map(|_| None).collect();

        for group in group_by_identifier(units) {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if self.stop.is_stop_requested() {
                tracing::info!("Stop requested, not starting remaining diagrams");
                break;
            }

            let work: Vec<(String, String)> = group
                .iter()
                .map(|&i| (units[i].identifier().to_owned(), units[i].body().to_owned()))
                .collect();
            let renderer = Arc::clone(&self.renderer);
            let progress = Arc::clone(&self.progress);
            let stop = self.stop.clone();
            let output_dir = output_dir.to_path_buf();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let mut results = Vec::with_capacity(work.len());
                for (identifier, body) in work {
                    if stop.is_stop_requested() {
                        results.push(UnitOutcome::Skipped);
                        continue;
                    }
                    progress.started(&identifier);
                    match renderer.try_render(&identifier, &body, &output_dir, dpi).await {
                        Ok(image) => {
                            progress.rendered(&identifier, &image);
                            results.push(UnitOutcome::Rendered(image));
                        }
                        Err(error) => {
                            progress.failed(&error);
                            results.push(UnitOutcome::Failed(error));
                        }
                    }
                }
                results
            });
            handles.push((group, handle));
        }

        for (group, handle) in handles {
            match handle.await {
                Ok(results) => {
                    for (i, outcome) in group.into_iter().zip(results) {
                        outcomes[i] = Some(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Render task failed");
                    for i in group {
                        outcomes[i] = Some(UnitOutcome::Failed(RenderError {
                            identifier: units[i].identifier().to_owned(),
                            kind: RenderErrorKind::Io(format!("render task failed: {e}")),
                        }));
                    }
                }
            }
        }

        let outcomes: Vec<UnitOutcome> = outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or(UnitOutcome::Skipped))
            .collect();
        for (unit, outcome) in units.iter_mut().zip(&outcomes) {
            match outcome {
                UnitOutcome::Rendered(_) => unit.set_status(UnitStatus::Rendered),
                UnitOutcome::Failed(_) => unit.set_status(UnitStatus::Failed),
                UnitOutcome::Skipped => {}
            }
        }

        let report = RunReport::from_units(units, outcomes);
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            "Render run finished"
        );
        Ok(report)
    }

    fn check_duplicates(&self, units: &[DiagramUnit]) -> Result<(), PipelineError> {
        let duplicates = find_duplicates(units);
        let Some(first) = duplicates.first() else {
            return Ok(());
        };
        match self.on_duplicate {
            DuplicatePolicy::Error => Err(PipelineError::DuplicateIdentifier {
                identifier: first.identifier.clone(),
                lines: first.lines.clone(),
            }),
            DuplicatePolicy::Warn => {
                for duplicate in &duplicates {
                    tracing::warn!(
                        identifier = %duplicate.identifier,
                        lines = %format_lines(&duplicate.lines),
                        "Duplicate diagram identifier, the last figure wins"
                    );
                }
                Ok(())
            }
        }
    }
}

/// Unit indices grouped by identifier, in order of first occurrence.
fn group_by_identifier(units: &[DiagramUnit]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (i, unit) in units.iter().enumerate() {
        if let Some(&pos) = positions.get(unit.identifier()) {
            groups[pos].push(i);
        } else {
            positions.insert(unit.identifier(), groups.len());
            groups.push(vec![i]);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::FailureClass;
    use crate::template::StandaloneTemplate;
    use crate::testing::{
        BROKEN_BODY, ToolchainFixture, VALID_BODY, dir_entries, expected_raster, figure,
    };

    const OTHER_BODY: &str = "\\begin{tikzpicture}\n\\draw (0,0) circle (1);\n\\end{tikzpicture}";

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        stop_after_first: Option<StopHandle>,
    }

    impl RenderProgress for Recorder {
        fn started(&self, identifier: &str) {
            self.events.lock().unwrap().push(format!("start {identifier}"));
        }

        fn rendered(&self, identifier: &str, _image: &RenderedImage) {
            self.events.lock().unwrap().push(format!("ok {identifier}"));
            if let Some(stop) = &self.stop_after_first {
                stop.request_stop();
            }
        }

        fn failed(&self, error: &RenderError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {} {}", error.identifier, error.kind.class()));
        }
    }

    fn unit(label: &str, line: usize) -> DiagramUnit {
        DiagramUnit::new(label, line, VALID_BODY)
    }

    #[test]
    fn test_duplicate_policy_parse() {
        assert_eq!(DuplicatePolicy::parse("warn"), Some(DuplicatePolicy::Warn));
        assert_eq!(DuplicatePolicy::parse("error"), Some(DuplicatePolicy::Error));
        assert_eq!(DuplicatePolicy::parse("ignore"), None);
    }

    #[test]
    fn test_group_by_identifier() {
        let units = vec![
            unit("fig:a", 1),
            unit("fig:b", 2),
            unit("tab:a", 3),
            unit("fig:c", 4),
        ];
        assert_eq!(group_by_identifier(&units), vec![vec![0, 2], vec![1], vec![3]]);
    }

    #[test]
    fn test_stop_handle_shared() {
        let handle = StopHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_stop_requested());
        clone.request_stop();
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn test_duplicate_error_message() {
        let error = PipelineError::DuplicateIdentifier {
            identifier: "same".to_owned(),
            lines: vec![3, 12],
        };
        assert_eq!(
            error.to_string(),
            "duplicate diagram identifier 'same' (figures at lines 3, 12)"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partial_failure() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "Intro.\n{}\nMiddle.\n{}",
            figure(VALID_BODY, "fig:alpha"),
            figure(BROKEN_BODY, "fig:beta")
        );

        let report = Pipeline::new(fixture.renderer())
            .jobs(2)
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(
            report.summary_line(fixture.output_dir()),
            format!("Done: 1/2 diagrams rendered to {}", fixture.output_dir().display())
        );
        assert_eq!(dir_entries(fixture.output_dir()), vec!["alpha.png"]);
        assert_eq!(report.units[0].status, UnitStatus::Rendered);
        assert_eq!(report.units[1].status, UnitStatus::Failed);
        assert_eq!(
            report.units[1].failure.as_ref().unwrap().class,
            FailureClass::Compilation
        );
        assert!(dir_entries(fixture.scratch_root()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_document_creates_output_dir() {
        let fixture = ToolchainFixture::new();
        let output_dir = fixture.output_dir().join("nested/figures");

        let report = Pipeline::new(fixture.renderer())
            .run("No figures here.\n", &output_dir, 300)
            .await
            .unwrap();

        assert_eq!(report, RunReport::default());
        assert!(output_dir.is_dir());
        assert!(dir_entries(&output_dir).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_dir_conflict_is_fatal() {
        let fixture = ToolchainFixture::new();
        let blocker = fixture.output_dir().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = Pipeline::new(fixture.renderer())
            .run(&figure(VALID_BODY, "fig:alpha"), &blocker, 300)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::OutputDir { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reruns_are_byte_identical() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}",
            figure(VALID_BODY, "fig:alpha"),
            figure(OTHER_BODY, "fig:gamma")
        );
        let pipeline = Pipeline::new(fixture.renderer()).jobs(2);
        let first = fixture.output_dir().join("first");
        let second = fixture.output_dir().join("second");

        pipeline.run(&document, &first, 300).await.unwrap();
        pipeline.run(&document, &second, 300).await.unwrap();

        for name in ["alpha.png", "gamma.png"] {
            assert_eq!(
                std::fs::read(first.join(name)).unwrap(),
                std::fs::read(second.join(name)).unwrap()
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_many_diagrams_report_in_document_order() {
        let fixture = ToolchainFixture::new();
        let labels = ["fig:a", "fig:b", "fig:c", "fig:d", "fig:e", "fig:f"];
        let document: String = labels.iter().map(|label| figure(VALID_BODY, label)).collect();

        let report = Pipeline::new(fixture.renderer())
            .jobs(3)
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 6);
        let identifiers: Vec<_> = report.units.iter().map(|u| u.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(dir_entries(fixture.output_dir()).len(), 6);
        assert!(dir_entries(fixture.scratch_root()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_duplicate_identifier_last_wins() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}",
            figure(VALID_BODY, "fig:same"),
            figure(OTHER_BODY, "tab:same")
        );

        let report = Pipeline::new(fixture.renderer())
            .jobs(4)
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(dir_entries(fixture.output_dir()), vec!["same.png"]);
        assert_eq!(
            std::fs::read_to_string(fixture.output_dir().join("same.png")).unwrap(),
            expected_raster(300, &StandaloneTemplate::default().assemble(OTHER_BODY))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_duplicate_identifier_error_policy() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}",
            figure(VALID_BODY, "fig:same"),
            figure(OTHER_BODY, "fig:same")
        );

        let err = Pipeline::new(fixture.renderer())
            .on_duplicate(DuplicatePolicy::Error)
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::DuplicateIdentifier { ref identifier, .. } if identifier == "same"
        ));
        assert!(dir_entries(fixture.output_dir()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_before_run_skips_everything() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}",
            figure(VALID_BODY, "fig:alpha"),
            figure(OTHER_BODY, "fig:gamma")
        );
        let pipeline = Pipeline::new(fixture.renderer());
        pipeline.stop_handle().request_stop();

        let report = pipeline
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.units[0].status, UnitStatus::Pending);
        assert!(dir_entries(fixture.output_dir()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_mid_run_finishes_in_flight_unit() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}{}",
            figure(VALID_BODY, "fig:a"),
            figure(VALID_BODY, "fig:b"),
            figure(VALID_BODY, "fig:c")
        );
        let pipeline = Pipeline::new(fixture.renderer()).jobs(1);
        let recorder = Arc::new(Recorder {
            stop_after_first: Some(pipeline.stop_handle()),
            ..Recorder::default()
        });
        let pipeline = pipeline.progress(Arc::clone(&recorder) as Arc<dyn RenderProgress>);

        let report = pipeline
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(dir_entries(fixture.output_dir()), vec!["a.png"]);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["start a", "ok a"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_progress_events() {
        let fixture = ToolchainFixture::new();
        let document = format!(
            "{}{}",
            figure(VALID_BODY, "fig:alpha"),
            figure(BROKEN_BODY, "fig:beta")
        );
        let recorder = Arc::new(Recorder::default());

        Pipeline::new(fixture.renderer())
            .progress(Arc::clone(&recorder) as Arc<dyn RenderProgress>)
            .run(&document, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "start alpha",
                "ok alpha",
                "start beta",
                "fail beta CompilationError"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_units_sets_status() {
        let fixture = ToolchainFixture::new();
        let mut units = vec![
            DiagramUnit::new("fig:ok", 1, VALID_BODY),
            DiagramUnit::new("fig:bad", 9, BROKEN_BODY),
        ];

        Pipeline::new(fixture.renderer())
            .run_units(&mut units, fixture.output_dir(), 300)
            .await
            .unwrap();

        assert_eq!(units[0].status(), UnitStatus::Rendered);
        assert_eq!(units[1].status(), UnitStatus::Failed);
    }
}
