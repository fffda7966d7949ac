//! Run outcomes.
//!
//! A [`RunReport`] is produced by every pipeline run, including runs that
//! rendered nothing. It serializes to JSON for machine consumption.

use std::path::{Path, PathBuf};

use serde::Serialize;
use texfig_extract::{DiagramUnit, UnitStatus};

use crate::error::{FailureClass, RenderError};
use crate::renderer::RenderedImage;

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Units whose render was started.
    pub attempted: usize,
    /// Units that published an image.
    pub succeeded: usize,
    /// Units never started because a stop was requested.
    pub skipped: usize,
    /// Per-unit outcomes in document order.
    pub units: Vec<UnitReport>,
}

impl RunReport {
    /// Number of attempted units that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// Whether every attempted unit rendered and none were skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.attempted && self.skipped == 0
    }

    /// Human-readable completion line.
    #[must_use]
    pub fn summary_line(&self, output_dir: &Path) -> String {
        format!(
            "Done: {}/{} diagrams rendered to {}",
            self.succeeded,
            self.attempted,
            output_dir.display()
        )
    }

    /// Build a report from units whose status has been set.
    pub(crate) fn from_units(units: &[DiagramUnit], outcomes: Vec<UnitOutcome>) -> Self {
        let mut report = Self::default();
        for (unit, outcome) in units.iter().zip(outcomes) {
            match &outcome {
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Rendered(_) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                UnitOutcome::Failed(_) => report.attempted += 1,
            }
            report.units.push(UnitReport::new(unit, outcome));
        }
        report
    }
}

/// Outcome of one unit inside a run.
#[derive(Debug)]
pub(crate) enum UnitOutcome {
    Rendered(RenderedImage),
    Failed(RenderError),
    Skipped,
}

/// Outcome of one diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub identifier: String,
    pub label: String,
    /// 1-based line of the enclosing figure.
    pub line: usize,
    /// `pending` for skipped units.
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl UnitReport {
    fn new(unit: &DiagramUnit, outcome: UnitOutcome) -> Self {
        let mut report = Self {
            identifier: unit.identifier().to_owned(),
            label: unit.label().to_owned(),
            line: unit.line(),
            status: unit.status(),
            output: None,
            bytes: None,
            failure: None,
        };
        match outcome {
            UnitOutcome::Rendered(image) => {
                report.output = Some(image.path);
                report.bytes = Some(image.bytes);
            }
            UnitOutcome::Failed(error) => {
                report.failure = Some(FailureReport {
                    class: error.kind.class(),
                    message: error.kind.to_string(),
                    log_tail: error.kind.log_tail().to_vec(),
                });
            }
            UnitOutcome::Skipped => {}
        }
        report
    }
}

/// Classified failure of one diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub class: FailureClass,
    pub message: String,
    pub log_tail: Vec<String>,
}
