//! Removal of equation cross-references from diagram bodies.
//!
//! A diagram compiled on its own has no access to the document's equation
//! numbering, so `\eqref{...}` would render as `(??)`. The references are
//! deleted rather than resolved.

use std::sync::LazyLock;

use regex::Regex;

/// Phrases removed as a whole, including their lead-in text.
///
/// These appear in existing figure captions next to the formula they point
/// at, so dropping only the macro would leave a dangling "via Eq.~".
const KNOWN_REFERENCE_PHRASES: &[&str] = &[
    r"via Eq.~\eqref{eq:radius_standard}",
    r"via Eq.~\eqref{eq:radius_gradient}",
];

static EQREF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\eqref\{[^}]*\}").unwrap());

/// Delete equation cross-references from a diagram body.
///
/// Known phrases are removed first, then every remaining `\eqref{...}` is
/// removed. Passes repeat until nothing changes, so a deletion that splices
/// a new `\eqref` together is also caught and applying this to an already
/// stripped body returns it unchanged.
#[must_use]
pub fn strip_equation_refs(body: &str) -> String {
    let mut cleaned = body.to_owned();
    while cleaned.contains(r"\eqref") {
        let next = strip_once(&cleaned);
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned
}

fn strip_once(body: &str) -> String {
    let mut cleaned = body.to_owned();
    for phrase in KNOWN_REFERENCE_PHRASES {
        cleaned = cleaned.replace(phrase, "");
    }
    EQREF_PATTERN.replace_all(&cleaned, "").into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_no_references_unchanged() {
        let body = r"\node {$r = 2$};";
        assert_eq!(strip_equation_refs(body), body);
    }

    #[test]
    fn test_known_phrase_removed_with_lead_in() {
        let body = r"\node {radius via Eq.~\eqref{eq:radius_standard}};";
        assert_eq!(strip_equation_refs(body), r"\node {radius };");
    }

    #[test]
    fn test_both_known_phrases_removed() {
        let body = r"a via Eq.~\eqref{eq:radius_standard} b via Eq.~\eqref{eq:radius_gradient} c";
        assert_eq!(strip_equation_refs(body), "a  b  c");
    }

    #[test]
    fn test_generic_eqref_removed() {
        let body = r"\node {see \eqref{eq:loss} and \eqref{eq:grad}};";
        assert_eq!(strip_equation_refs(body), r"\node {see  and };");
    }

    #[test]
    fn test_unknown_phrase_keeps_lead_in() {
        let body = r"via Eq.~\eqref{eq:other}";
        assert_eq!(strip_equation_refs(body), "via Eq.~");
    }

    #[test]
    fn test_other_ref_macros_untouched() {
        let body = r"\node {Fig.~\ref{fig:a}};";
        assert_eq!(strip_equation_refs(body), body);
    }

    #[test]
    fn test_spliced_reference_removed() {
        let body = r"\eq\eqref{eq:a}ref{eq:b} tail";
        assert_eq!(strip_equation_refs(body), " tail");
    }

    #[test]
    fn test_stripping_is_idempotent() {
        let bodies = [
            r"x via Eq.~\eqref{eq:radius_gradient} y",
            r"\eqref{eq:a}\eqref{eq:b}",
            r"\node {plain};",
            r"\eqref{}",
            r"\eq\eqref{eq:a}ref{eq:b}",
        ];
        for body in bodies {
            let once = strip_equation_refs(body);
            let twice = strip_equation_refs(&once);
            assert_eq!(once, twice, "not idempotent for {body:?}");
        }
    }
}
