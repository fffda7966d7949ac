//! Stand-in toolchain for tests.
//!
//! The fake engine copies the `.tex` input to the `.pdf` output, or fails with
//! TeX-like diagnostics when the input contains `BROKEN`. The fake rasterizer
//! writes a header line with the requested resolution followed by the PDF
//! content. Both are shell scripts run through `sh`, so no executable bit is
//! needed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::renderer::Renderer;
use crate::toolchain::ToolCommand;

pub(crate) const VALID_BODY: &str =
    "\\begin{tikzpicture}\n\\draw (0,0) -- (1,1);\n\\end{tikzpicture}";

pub(crate) const BROKEN_BODY: &str = "\\begin{tikzpicture}\n\\BROKEN\n\\end{tikzpicture}";

const FAKE_COMPILER: &str = r#"last=""
for arg in "$@"; do last="$arg"; done
if grep -q BROKEN "$last"; then
  echo "This is fake pdfTeX"
  echo "! Undefined control sequence."
  printf '%s\n' 'l.9 \BROKEN'
  exit 1
fi
cat "$last" > "${last%.tex}.pdf"
echo "Output written on ${last%.tex}.pdf"
"#;

// Arguments: <-png|-jpeg> -r <dpi> -singlefile <pdf> <prefix>
const FAKE_RASTERIZER: &str = r#"ext=png
if [ "$1" = "-jpeg" ]; then ext=jpg; fi
printf 'raster dpi=%s\n' "$3" > "$6.$ext"
cat "$5" >> "$6.$ext"
"#;

/// Content the fake toolchain publishes for an assembled document.
pub(crate) fn expected_raster(dpi: u32, document: &str) -> String {
    format!("raster dpi={dpi}\n{document}")
}

/// Sorted file names in a directory.
pub(crate) fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Wrap a diagram body in a labelled figure.
pub(crate) fn figure(body: &str, label: &str) -> String {
    format!(
        "\\begin{{figure}}[h]\n\\centering\n{body}\n\\caption{{Caption}}\n\\label{{{label}}}\n\\end{{figure}}\n"
    )
}

/// Temp tree with tool scripts, an output directory and a scratch root.
pub(crate) struct ToolchainFixture {
    root: TempDir,
    output_dir: PathBuf,
    scratch_root: PathBuf,
}

impl ToolchainFixture {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("tools")).unwrap();
        let output_dir = root.path().join("out");
        let scratch_root = root.path().join("scratch");
        std::fs::create_dir(&output_dir).unwrap();
        std::fs::create_dir(&scratch_root).unwrap();
        Self {
            root,
            output_dir,
            scratch_root,
        }
    }

    pub(crate) fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub(crate) fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Write a script and return a command that runs it through `sh`.
    pub(crate) fn script(&self, name: &str, body: &str) -> ToolCommand {
        let path = self.root.path().join("tools").join(format!("{name}.sh"));
        std::fs::write(&path, body).unwrap();
        ToolCommand::new("sh").arg(path.to_string_lossy().into_owned())
    }

    /// Renderer wired to the fake engine and rasterizer.
    pub(crate) fn renderer(&self) -> Renderer {
        Renderer::new()
            .compiler(self.script("fake-tex", FAKE_COMPILER))
            .rasterizer(self.script("fake-ppm", FAKE_RASTERIZER))
            .scratch_root(&self.scratch_root)
    }

    /// Mode of a file created the way the fake rasterizer creates its output.
    #[cfg(unix)]
    pub(crate) fn reference_raster_mode(&self) -> u32 {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("tools/reference");
        std::fs::write(&path, "x").unwrap();
        std::fs::metadata(&path).unwrap().permissions().mode()
    }
}
