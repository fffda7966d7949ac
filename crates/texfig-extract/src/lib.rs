//! TikZ figure extraction for texfig.
//!
//! This crate locates self-contained diagrams inside a LaTeX document:
//! - [`scan`] walks the source with an explicit marker scanner and returns every
//!   `figure` environment that holds a `tikzpicture` followed by a `\label`
//! - [`DiagramUnit`] carries the label-derived identifier and the diagram body
//! - [`strip_equation_refs`] removes `\eqref` macros that cannot resolve outside
//!   the full document
//!
//! Extraction is a pure function over text. Reading the document and rendering
//! the diagrams are handled by `texfig-render`.
//!
//! # Example
//!
//! ```
//! use texfig_extract::extract;
//!
//! let source = r"
//! \begin{figure}
//!   \begin{tikzpicture}\draw (0,0) -- (1,1);\end{tikzpicture}
//!   \caption{A line}
//!   \label{fig:line}
//! \end{figure}
//! ";
//!
//! let units = extract(source);
//! assert_eq!(units.len(), 1);
//! assert_eq!(units[0].identifier(), "line");
//! ```

mod references;
mod scanner;
mod unit;

pub use references::strip_equation_refs;
pub use scanner::{Extraction, scan};
pub use unit::{DiagramUnit, Duplicate, UnitStatus, find_duplicates, identifier_from_label};

/// Extract all diagram units from a document, in source order.
///
/// Shorthand for [`scan`] when the warnings are not needed. Returns an empty
/// vector when the document has no diagram regions.
#[must_use]
pub fn extract(document: &str) -> Vec<DiagramUnit> {
    scan(document).units
}
