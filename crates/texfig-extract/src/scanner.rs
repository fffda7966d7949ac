//! Marker scanner for `figure` / `tikzpicture` regions.
//!
//! The scanner tokenizes only what it needs (`\begin{..}`, `\end{..}`,
//! `\label{..}` and `%` comments) and drives a small state machine:
//!
//! ```text
//! OutsideContainer --\begin{figure}--> BeforeDiagram
//! BeforeDiagram    --\begin{tikzpicture}--> InsideDiagram
//! InsideDiagram    --matching \end{tikzpicture}--> AfterDiagram
//! AfterDiagram     --\end{figure}--> OutsideContainer (emit if labelled)
//! ```
//!
//! Begin/end depth is tracked for both environments, so a nested
//! `tikzpicture` or a container without a diagram never bleeds into the
//! next figure.

use crate::unit::DiagramUnit;

/// Environments that can hold an extractable diagram.
const CONTAINER_ENVIRONMENTS: &[&str] = &["figure", "figure*"];

/// Environment captured as the diagram body.
const DIAGRAM_ENVIRONMENT: &str = "tikzpicture";

/// Result of scanning a document.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Extracted units in source order.
    pub units: Vec<DiagramUnit>,
    /// Regions that looked like diagrams but were skipped.
    pub warnings: Vec<String>,
}

/// Scan a document and extract every labelled diagram.
///
/// A unit is produced for each `figure` (or `figure*`) environment that
/// contains a `tikzpicture` environment followed by a `\label{..}` before
/// the figure closes. Only the first diagram of a figure is captured.
#[must_use]
pub fn scan(document: &str) -> Extraction {
    let mut scanner = Scanner::new(document);
    for marker in Markers::new(document) {
        scanner.step(&marker);
    }
    scanner.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind<'a> {
    Begin(&'a str),
    End(&'a str),
    Label(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker<'a> {
    kind: MarkerKind<'a>,
    /// Byte offset of the leading backslash.
    start: usize,
    /// Byte offset just past the closing brace.
    end: usize,
}

/// Iterator over structural markers, skipping `%` comments.
struct Markers<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Markers<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Parse `\name{arg}` at `start`, where `start` points at the backslash.
    ///
    /// Returns the command name, its argument and the offset after `}`.
    /// Whitespace between the name and `{` is allowed; the argument must not
    /// span lines.
    fn parse_command(&self, start: usize) -> Option<(&'a str, &'a str, usize)> {
        let text = self.text;
        let after_slash = start + 1;
        let name_len = text[after_slash..]
            .bytes()
            .take_while(u8::is_ascii_alphabetic)
            .count();
        if name_len == 0 {
            return None;
        }
        let name = &text[after_slash..after_slash + name_len];

        let mut cursor = after_slash + name_len;
        cursor += text[cursor..]
            .bytes()
            .take_while(|b| *b == b' ' || *b == b'\t')
            .count();
        if text.as_bytes().get(cursor) != Some(&b'{') {
            return None;
        }

        let arg_start = cursor + 1;
        let arg_len = text[arg_start..].find(['}', '\n'])?;
        let arg_end = arg_start + arg_len;
        if text.as_bytes()[arg_end] != b'}' {
            return None;
        }
        Some((name, &text[arg_start..arg_end], arg_end + 1))
    }
}

impl<'a> Iterator for Markers<'a> {
    type Item = Marker<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.text;
        loop {
            let offset = text[self.pos..].find(['\\', '%'])?;
            let at = self.pos + offset;

            if text.as_bytes()[at] == b'%' {
                self.pos = text[at..].find('\n').map_or(text.len(), |nl| at + nl + 1);
                continue;
            }

            if let Some((name, arg, end)) = self.parse_command(at) {
                let kind = match name {
                    "begin" => Some(MarkerKind::Begin(arg.trim())),
                    "end" => Some(MarkerKind::End(arg.trim())),
                    "label" => Some(MarkerKind::Label(arg.trim())),
                    _ => None,
                };
                if let Some(kind) = kind {
                    self.pos = end;
                    return Some(Marker {
                        kind,
                        start: at,
                        end,
                    });
                }
            }

            // Skip the backslash and whatever it escapes (`\%`, `\\`, `\draw`...).
            let escaped = text[at + 1..].chars().next().map_or(0, char::len_utf8);
            self.pos = at + 1 + escaped;
        }
    }
}

#[derive(Debug)]
enum State<'a> {
    OutsideContainer,
    BeforeDiagram {
        open: usize,
        depth: usize,
    },
    InsideDiagram {
        open: usize,
        depth: usize,
        body_start: usize,
        diagram_depth: usize,
    },
    AfterDiagram {
        open: usize,
        depth: usize,
        body: &'a str,
        label: Option<&'a str>,
    },
}

struct Scanner<'a> {
    text: &'a str,
    state: State<'a>,
    extraction: Extraction,
}

fn is_container(name: &str) -> bool {
    CONTAINER_ENVIRONMENTS.contains(&name)
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            state: State::OutsideContainer,
            extraction: Extraction::default(),
        }
    }

    /// 1-based line number of a byte offset.
    fn line_of(&self, offset: usize) -> usize {
        self.text[..offset].matches('\n').count() + 1
    }

    fn warn(&mut self, open: usize, message: &str) {
        let line = self.line_of(open);
        self.extraction
            .warnings
            .push(format!("figure at line {line}: {message}"));
    }

    fn step(&mut self, marker: &Marker<'a>) {
        let text = self.text;
        let state = std::mem::replace(&mut self.state, State::OutsideContainer);
        self.state = match (state, marker.kind) {
            (State::OutsideContainer, MarkerKind::Begin(name)) if is_container(name) => {
                State::BeforeDiagram {
                    open: marker.start,
                    depth: 1,
                }
            }
            (State::OutsideContainer, _) => State::OutsideContainer,

            (State::BeforeDiagram { open, depth }, MarkerKind::Begin(DIAGRAM_ENVIRONMENT)) => {
                State::InsideDiagram {
                    open,
                    depth,
                    body_start: marker.start,
                    diagram_depth: 1,
                }
            }
            (State::BeforeDiagram { open, depth }, MarkerKind::Begin(name))
                if is_container(name) =>
            {
                State::BeforeDiagram {
                    open,
                    depth: depth + 1,
                }
            }
            (State::BeforeDiagram { open, depth }, MarkerKind::End(name)) if is_container(name) => {
                if depth == 1 {
                    State::OutsideContainer
                } else {
                    State::BeforeDiagram {
                        open,
                        depth: depth - 1,
                    }
                }
            }
            (state @ State::BeforeDiagram { .. }, _) => state,

            (
                State::InsideDiagram {
                    open,
                    depth,
                    body_start,
                    diagram_depth,
                },
                MarkerKind::Begin(DIAGRAM_ENVIRONMENT),
            ) => State::InsideDiagram {
                open,
                depth,
                body_start,
                diagram_depth: diagram_depth + 1,
            },
            (
                State::InsideDiagram {
                    open,
                    depth,
                    body_start,
                    diagram_depth,
                },
                MarkerKind::End(DIAGRAM_ENVIRONMENT),
            ) => {
                if diagram_depth == 1 {
                    State::AfterDiagram {
                        open,
                        depth,
                        body: &text[body_start..marker.end],
                        label: None,
                    }
                } else {
                    State::InsideDiagram {
                        open,
                        depth,
                        body_start,
                        diagram_depth: diagram_depth - 1,
                    }
                }
            }
            (State::InsideDiagram { open, depth, .. }, MarkerKind::End(name))
                if is_container(name) && depth == 1 =>
            {
                self.warn(open, "tikzpicture not closed before end of figure; skipped");
                State::OutsideContainer
            }
            (state @ State::InsideDiagram { .. }, _) => state,

            (
                State::AfterDiagram {
                    open,
                    depth,
                    body,
                    label: None,
                },
                MarkerKind::Label(label),
            ) => State::AfterDiagram {
                open,
                depth,
                body,
                label: Some(label),
            },
            (
                State::AfterDiagram {
                    open,
                    depth,
                    body,
                    label,
                },
                MarkerKind::Begin(name),
            ) if is_container(name) => State::AfterDiagram {
                open,
                depth: depth + 1,
                body,
                label,
            },
            (
                State::AfterDiagram {
                    open,
                    depth,
                    body,
                    label,
                },
                MarkerKind::End(name),
            ) if is_container(name) => {
                if depth == 1 {
                    self.emit(open, body, label);
                    State::OutsideContainer
                } else {
                    State::AfterDiagram {
                        open,
                        depth: depth - 1,
                        body,
                        label,
                    }
                }
            }
            (state @ State::AfterDiagram { .. }, _) => state,
        };
    }

    fn emit(&mut self, open: usize, body: &str, label: Option<&str>) {
        let Some(label) = label else {
            self.warn(open, "tikzpicture has no \\label after it; skipped");
            return;
        };
        let unit = DiagramUnit::new(label, self.line_of(open), body);
        if unit.identifier().is_empty() {
            self.warn(open, &format!("label '{label}' yields an empty identifier; skipped"));
            return;
        }
        self.extraction.units.push(unit);
    }

    fn finish(mut self) -> Extraction {
        match self.state {
            State::OutsideContainer => {}
            State::BeforeDiagram { open, .. }
            | State::InsideDiagram { open, .. }
            | State::AfterDiagram { open, .. } => {
                self.warn(open, "figure is not closed before end of document; skipped");
            }
        }
        self.extraction
    }
}
