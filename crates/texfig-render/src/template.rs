//! Standalone document assembly.
//!
//! Diagrams are written against the full document's preamble. The template
//! declares only what TikZ figures in the source rely on: font encoding,
//! AMS math symbols, TikZ with its libraries and `enumitem` for lists inside
//! nodes.

/// Preamble lines emitted before the TikZ library declaration.
const PREAMBLE_HEAD: &str = "\\documentclass[border=10pt,varwidth=\\maxdimen]{standalone}
\\usepackage[T1]{fontenc}
\\usepackage{amsmath,amssymb}
\\usepackage{tikz}
";

/// TikZ libraries loaded by default.
///
/// `texfig_config::TemplateConfig::default` carries the same list.
const DEFAULT_TIKZ_LIBRARIES: &[&str] = &[
    "shapes.geometric",
    "arrows.meta",
    "positioning",
    "calc",
    "fit",
    "backgrounds",
];

/// Minimal wrapper document that compiles a single diagram on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneTemplate {
    tikz_libraries: Vec<String>,
    extra_preamble: Vec<String>,
}

impl Default for StandaloneTemplate {
    fn default() -> Self {
        Self {
            tikz_libraries: DEFAULT_TIKZ_LIBRARIES
                .iter()
                .map(|lib| (*lib).to_owned())
                .collect(),
            extra_preamble: Vec::new(),
        }
    }
}

impl StandaloneTemplate {
    /// Create a template with custom TikZ libraries and extra preamble lines.
    #[must_use]
    pub fn new(tikz_libraries: Vec<String>, extra_preamble: Vec<String>) -> Self {
        Self {
            tikz_libraries,
            extra_preamble,
        }
    }

    /// Wrap a diagram body into a complete document.
    #[must_use]
    pub fn assemble(&self, body: &str) -> String {
        let mut document = String::with_capacity(PREAMBLE_HEAD.len() + body.len() + 256);
        document.push_str(PREAMBLE_HEAD);
        if !self.tikz_libraries.is_empty() {
            document.push_str("\\usetikzlibrary{");
            document.push_str(&self.tikz_libraries.join(", "));
            document.push_str("}\n");
        }
        document.push_str("\\usepackage{enumitem}\n");
        for line in &self.extra_preamble {
            document.push_str(line);
            document.push('\n');
        }
        document.push_str("\\begin{document}\n");
        document.push_str(body);
        document.push_str("\n\\end{document}\n");
        document
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_template() {
        let document = StandaloneTemplate::default().assemble("\\begin{tikzpicture}\\end{tikzpicture}");
        assert_eq!(
            document,
            "\\documentclass[border=10pt,varwidth=\\maxdimen]{standalone}
\\usepackage[T1]{fontenc}
\\usepackage{amsmath,amssymb}
\\usepackage{tikz}
\\usetikzlibrary{shapes.geometric, arrows.meta, positioning, calc, fit, backgrounds}
\\usepackage{enumitem}
\\begin{document}
\\begin{tikzpicture}\\end{tikzpicture}
\\end{document}
"
        );
    }

    #[test]
    fn test_custom_libraries_and_preamble() {
        let template = StandaloneTemplate::new(
            vec!["matrix".to_owned()],
            vec!["\\usepackage{xcolor}".to_owned()],
        );
        let document = template.assemble("BODY");

        assert!(document.contains("\\usetikzlibrary{matrix}\n"));
        assert!(document.contains("\\usepackage{enumitem}\n\\usepackage{xcolor}\n\\begin{document}"));
    }

    #[test]
    fn test_no_libraries() {
        let document = StandaloneTemplate::new(Vec::new(), Vec::new()).assemble("BODY");
        assert!(!document.contains("\\usetikzlibrary"));
        assert!(document.contains("\\begin{document}\nBODY\n\\end{document}\n"));
    }

    #[test]
    fn test_body_is_verbatim() {
        let body = "\\begin{tikzpicture}\n  % comment\n  \\node {50\\%};\n\\end{tikzpicture}";
        let document = StandaloneTemplate::default().assemble(body);
        assert!(document.contains(body));
    }
}
