//! The diagram unit produced by extraction.

use serde::Serialize;

use crate::references::strip_equation_refs;

/// Rendering status of a [`DiagramUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// Extracted, not rendered yet.
    #[default]
    Pending,
    /// Image published to the output directory.
    Rendered,
    /// Rendering failed; no image was published.
    Failed,
}

impl UnitStatus {
    /// Return status as string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rendered => "rendered",
            Self::Failed => "failed",
        }
    }
}

/// A diagram extracted from a document.
///
/// Everything except [`status`](Self::status) is fixed at extraction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramUnit {
    identifier: String,
    label: String,
    line: usize,
    body: String,
    status: UnitStatus,
}

impl DiagramUnit {
    /// Create a unit from a declared label and the raw diagram region.
    ///
    /// The identifier is derived from `label` with [`identifier_from_label`]
    /// and equation references are stripped from `body`.
    #[must_use]
    pub fn new(label: &str, line: usize, body: &str) -> Self {
        Self {
            identifier: identifier_from_label(label).to_owned(),
            label: label.to_owned(),
            line,
            body: strip_equation_refs(body),
            status: UnitStatus::Pending,
        }
    }

    /// Output filename stem.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Label as declared in the document (e.g. `fig:pipeline`).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 1-based line of the enclosing figure's `\begin`.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Diagram source including its `\begin{tikzpicture}`/`\end{tikzpicture}`.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn set_status(&mut self, status: UnitStatus) {
        self.status = status;
    }
}

/// Derive an output identifier from a LaTeX label.
///
/// Drops the namespace prefix up to and including the first `:`
/// (`fig:pipeline` becomes `pipeline`). Labels without a colon are used as-is.
/// No other sanitization happens.
#[must_use]
pub fn identifier_from_label(label: &str) -> &str {
    label.split_once(':').map_or(label, |(_, rest)| rest)
}

/// Units that share an identifier and would overwrite each other's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub identifier: String,
    /// Source lines of every unit with this identifier, in document order.
    pub lines: Vec<usize>,
}

/// Find identifiers used by more than one unit.
///
/// Groups are returned in order of first occurrence.
#[must_use]
pub fn find_duplicates(units: &[DiagramUnit]) -> Vec<Duplicate> {
    let mut groups: Vec<Duplicate> = Vec::new();
    for unit in units {
        match groups.iter_mut().find(|g| g.identifier == unit.identifier) {
            Some(group) => group.lines.push(unit.line),
            None => groups.push(Duplicate {
                identifier: unit.identifier.clone(),
                lines: vec![unit.line],
            }),
        }
    }
    groups.retain(|g| g.lines.len() > 1);
    groups
}
