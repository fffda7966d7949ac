//! Configuration management for texfig.
//!
//! `texfig.toml` is looked up in the working directory and its ancestors
//! unless an explicit path is given. Sections:
//! - `[render]`: output directory, resolution, image format, jobs, duplicate policy
//! - `[toolchain]`: engine and rasterizer argv, timeouts, log tail, scratch root
//! - `[template]`: TikZ libraries and extra preamble lines
//!
//! Relative paths resolve against the directory holding the file. Command
//! line overrides arrive as [`CliSettings`] and are applied before
//! validation.
//!
//! `${VAR}` and `${VAR:-default}` are expanded in `render.output_dir`,
//! `toolchain.scratch_dir` and every element of `toolchain.compiler` /
//! `toolchain.rasterizer`.

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override output directory for rendered images.
    pub output_dir: Option<PathBuf>,
    /// Override raster resolution.
    pub dpi: Option<u32>,
    /// Override image format (`png`, `jpeg` or `jpg`).
    pub format: Option<String>,
    /// Override worker count.
    pub jobs: Option<usize>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "texfig.toml";

/// Default raster resolution, matching print-quality figures.
pub const DEFAULT_DPI: u32 = 300;

/// Upper bound for `render.dpi`.
const MAX_DPI: u32 = 2400;

/// Supported values for `render.format`.
const FORMATS: &[&str] = &["png", "jpeg", "jpg"];

/// Supported values for `render.on_duplicate`.
const DUPLICATE_POLICIES: &[&str] = &["warn", "error"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render configuration (paths are relative strings from TOML).
    render: RenderConfigRaw,
    /// Toolchain configuration (paths are relative strings from TOML).
    toolchain: ToolchainConfigRaw,
    /// Standalone template configuration.
    pub template: TemplateConfig,

    /// Resolved render configuration (set after loading).
    #[serde(skip)]
    pub render_resolved: RenderConfig,
    /// Resolved toolchain configuration (set after loading).
    #[serde(skip)]
    pub toolchain_resolved: ToolchainConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw render configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RenderConfigRaw {
    output_dir: Option<String>,
    dpi: Option<u32>,
    format: Option<String>,
    jobs: Option<usize>,
    on_duplicate: Option<String>,
}

/// Resolved render configuration with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Directory receiving `<identifier>.<ext>` images.
    pub output_dir: PathBuf,
    /// Raster resolution in dots per inch.
    pub dpi: u32,
    /// Image format name (`png`, `jpeg` or `jpg`).
    pub format: String,
    /// Maximum number of diagrams rendered concurrently.
    pub jobs: usize,
    /// What to do when two diagrams share an identifier (`warn` or `error`).
    pub on_duplicate: String,
}

impl RenderConfig {
    fn default_with_base(base: &Path) -> Self {
        Self {
            output_dir: base.join("figures"),
            dpi: DEFAULT_DPI,
            format: "png".to_owned(),
            jobs: default_jobs(),
            on_duplicate: "warn".to_owned(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Raw toolchain configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ToolchainConfigRaw {
    compiler: Option<Vec<String>>,
    rasterizer: Option<Vec<String>>,
    compile_timeout_secs: Option<u64>,
    convert_timeout_secs: Option<u64>,
    log_tail_lines: Option<usize>,
    scratch_dir: Option<String>,
}

/// Resolved external toolchain configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Typesetting engine command (program followed by leading arguments).
    pub compiler: Vec<String>,
    /// PDF-to-raster command (program followed by leading arguments).
    pub rasterizer: Vec<String>,
    /// Wall-clock limit for one compilation.
    pub compile_timeout: Duration,
    /// Wall-clock limit for one rasterization.
    pub convert_timeout: Duration,
    /// Number of trailing engine output lines kept in failure reports.
    pub log_tail_lines: usize,
    /// Parent directory for scratch workspaces (system temp dir when unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: vec!["pdflatex".to_owned()],
            rasterizer: vec!["pdftoppm".to_owned()],
            // Mirrors texfig_render::{DEFAULT_COMPILE_TIMEOUT, DEFAULT_CONVERT_TIMEOUT,
            // DEFAULT_LOG_TAIL_LINES}; keep both in step.
            compile_timeout: Duration::from_secs(60),
            convert_timeout: Duration::from_secs(30),
            log_tail_lines: 30,
            scratch_dir: None,
        }
    }
}

/// Standalone template configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Libraries passed to `\usetikzlibrary`.
    pub tikz_libraries: Vec<String>,
    /// Extra preamble lines inserted before `\begin{document}`.
    pub extra_preamble: Vec<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            // Mirrors the library list of StandaloneTemplate::default().
            tikz_libraries: [
                "shapes.geometric",
                "arrows.meta",
                "positioning",
                "calc",
                "fit",
                "backgrounds",
            ]
            .map(str::to_owned)
            .to_vec(),
            extra_preamble: Vec::new(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`toolchain.compiler`").
        field: String,
        /// Error message (e.g., "${`TEXBIN`} not set").
        message: String,
    },
}

/// Require a value to be one of the allowed choices.
fn require_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ConfigError> {
    if !allowed.contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{field} must be one of: {} (got '{value}')",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Require a command to name a program.
fn require_command(command: &[String], field: &str) -> Result<(), ConfigError> {
    match command.first() {
        Some(program) if !program.is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "{field} must name a program"
        ))),
    }
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `texfig.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated once all overrides are in place.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(output_dir) = &settings.output_dir {
            self.render_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(dpi) = settings.dpi {
            self.render_resolved.dpi = dpi;
        }
        if let Some(format) = &settings.format {
            self.render_resolved.format.clone_from(format);
        }
        if let Some(jobs) = settings.jobs {
            self.render_resolved.jobs = jobs;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            render: RenderConfigRaw::default(),
            toolchain: ToolchainConfigRaw::default(),
            template: TemplateConfig::default(),
            render_resolved: RenderConfig::default_with_base(base),
            toolchain_resolved: ToolchainConfig::default(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_render()?;
        self.validate_toolchain()?;
        Ok(())
    }

    /// Validate render configuration.
    fn validate_render(&self) -> Result<(), ConfigError> {
        let render = &self.render_resolved;

        if render.dpi == 0 {
            return Err(ConfigError::Validation(
                "render.dpi must be greater than 0".to_owned(),
            ));
        }
        if render.dpi > MAX_DPI {
            return Err(ConfigError::Validation(format!(
                "render.dpi cannot exceed {MAX_DPI}"
            )));
        }
        if render.jobs == 0 {
            return Err(ConfigError::Validation(
                "render.jobs must be at least 1".to_owned(),
            ));
        }
        require_one_of(&render.format, FORMATS, "render.format")?;
        require_one_of(&render.on_duplicate, DUPLICATE_POLICIES, "render.on_duplicate")?;

        Ok(())
    }

    /// Validate toolchain configuration.
    fn validate_toolchain(&self) -> Result<(), ConfigError> {
        let toolchain = &self.toolchain_resolved;

        require_command(&toolchain.compiler, "toolchain.compiler")?;
        require_command(&toolchain.rasterizer, "toolchain.rasterizer")?;

        if toolchain.compile_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "toolchain.compile_timeout_secs must be greater than 0".to_owned(),
            ));
        }
        if toolchain.convert_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "toolchain.convert_timeout_secs must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref dir) = self.render.output_dir {
            self.render.output_dir = Some(expand::expand_env(dir, "render.output_dir")?);
        }
        if let Some(ref dir) = self.toolchain.scratch_dir {
            self.toolchain.scratch_dir = Some(expand::expand_env(dir, "toolchain.scratch_dir")?);
        }
        if let Some(ref mut compiler) = self.toolchain.compiler {
            expand::expand_argv(compiler, "toolchain.compiler")?;
        }
        if let Some(ref mut rasterizer) = self.toolchain.rasterizer {
            expand::expand_argv(rasterizer, "toolchain.rasterizer")?;
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = RenderConfig::default_with_base(config_dir);
        let render = &self.render;
        self.render_resolved = RenderConfig {
            output_dir: render
                .output_dir
                .as_ref()
                .map_or(defaults.output_dir, |d| config_dir.join(d)),
            dpi: render.dpi.unwrap_or(defaults.dpi),
            format: render.format.clone().unwrap_or(defaults.format),
            jobs: render.jobs.unwrap_or(defaults.jobs),
            on_duplicate: render.on_duplicate.clone().unwrap_or(defaults.on_duplicate),
        };

        let defaults = ToolchainConfig::default();
        let toolchain = &self.toolchain;
        self.toolchain_resolved = ToolchainConfig {
            compiler: toolchain.compiler.clone().unwrap_or(defaults.compiler),
            rasterizer: toolchain.rasterizer.clone().unwrap_or(defaults.rasterizer),
            compile_timeout: toolchain
                .compile_timeout_secs
                .map_or(defaults.compile_timeout, Duration::from_secs),
            convert_timeout: toolchain
                .convert_timeout_secs
                .map_or(defaults.convert_timeout, Duration::from_secs),
            log_tail_lines: toolchain.log_tail_lines.unwrap_or(defaults.log_tail_lines),
            scratch_dir: toolchain.scratch_dir.as_ref().map(|d| config_dir.join(d)),
        };
    }
}
