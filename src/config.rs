//! Configuration for the folio pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (FOLIO_REVIEW_MODE, FOLIO_MAX_REVISIONS, FOLIO_MODEL, FOLIO_OLLAMA_URL)
//! 2. Config file ($FOLIO_CONFIG, else .folio/config.yaml found in the
//!    current directory or a parent)
//! 3. Built-in defaults
//!
//! The home directory ($FOLIO_HOME, default ~/.folio) holds the database.
//! A relative `storage.database` resolves against home; a relative
//! `prompts_dir` resolves against the config file's directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::RetryPolicy;
use crate::domain::Stage;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// How a review round is executed; process-wide, not per story
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Reviewer first, then editor, then evaluation
    #[default]
    Sequential,
    /// Reviewer and editor at once; evaluation after both report
    Parallel,
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for ReviewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => anyhow::bail!("Unknown review mode '{}' (expected sequential|parallel)", other),
        }
    }
}

/// Workflow settings consumed by the orchestrator and agent loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Revision cap injected into each story at creation
    pub max_revisions: u32,
    pub review_mode: ReviewMode,
    /// Blocking-pop timeout; a timeout just loops again
    pub queue_timeout_seconds: u64,
    /// Sleep after a failed message before taking the next one
    pub error_backoff_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: 3,
            review_mode: ReviewMode::Sequential,
            queue_timeout_seconds: 5,
            error_backoff_seconds: 5,
        }
    }
}

impl PipelineConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }
}

/// Generation Service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_seconds: 300,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file, relative to the home directory
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "folio.db".to_string(),
        }
    }
}

/// A genre the prompt stage may pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub themes: Vec<String>,
    pub word_count_min: u32,
    pub word_count_max: u32,
}

impl Genre {
    fn new(name: &str, description: &str, themes: &[&str], min: u32, max: u32) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            themes: themes.iter().map(|t| t.to_string()).collect(),
            word_count_min: min,
            word_count_max: max,
        }
    }
}

fn default_genres() -> Vec<Genre> {
    vec![
        Genre::new(
            "science_fiction",
            "Speculative stories grounded in technology or science",
            &["first contact", "artificial minds", "generation ships"],
            1500,
            3000,
        ),
        Genre::new(
            "mystery",
            "A puzzle, a crime, and someone determined to solve it",
            &["locked room", "small-town secrets", "unreliable witness"],
            1500,
            3000,
        ),
        Genre::new(
            "fantasy",
            "Worlds where magic has rules and costs",
            &["a broken oath", "the last dragon", "forbidden libraries"],
            2000,
            3500,
        ),
        Genre::new(
            "horror",
            "Dread that builds until it cannot be ignored",
            &["the house remembers", "something in the water", "a dark forest"],
            1200,
            2500,
        ),
    ]
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Directory with per-agent system prompt overrides (`<agent>.txt`)
    pub prompts_dir: Option<String>,
    pub genres: Option<Vec<Genre>>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Folio home (database lives here unless configured otherwise)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub generation: GenerationConfig,
    /// Absolute database path
    pub database: PathBuf,
    pub prompts_dir: Option<PathBuf>,
    pub genres: Vec<Genre>,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`, with no config file
    pub fn with_home(home: PathBuf) -> Self {
        Self::from_file(home, None, ConfigFile::default())
    }

    fn from_file(home: PathBuf, config_file: Option<PathBuf>, file: ConfigFile) -> Self {
        let base_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.clone());

        let database = resolve_path(&home, &file.storage.database);
        let prompts_dir = file.prompts_dir.as_deref().map(|p| resolve_path(&base_dir, p));
        let genres = match file.genres {
            Some(genres) if !genres.is_empty() => genres,
            _ => default_genres(),
        };

        Self {
            home,
            config_file,
            pipeline: file.pipeline,
            generation: file.generation,
            database,
            prompts_dir,
            genres,
        }
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("FOLIO_REVIEW_MODE") {
            self.pipeline.review_mode = mode.parse()?;
        }
        if let Some(max) = lookup("FOLIO_MAX_REVISIONS") {
            self.pipeline.max_revisions = max
                .trim()
                .parse()
                .with_context(|| format!("Invalid FOLIO_MAX_REVISIONS: {}", max))?;
        }
        if let Some(model) = lookup("FOLIO_MODEL") {
            self.generation.model = model;
        }
        if let Some(url) = lookup("FOLIO_OLLAMA_URL") {
            self.generation.base_url = url;
        }
        Ok(())
    }

    /// Operator-supplied system prompt for a stage, if present on disk
    pub fn prompt_override(&self, stage: Stage) -> Option<String> {
        let path = self
            .prompts_dir
            .as_ref()?
            .join(format!("{}.txt", stage.as_str()));
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".folio").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let home = match std::env::var("FOLIO_HOME") {
        Ok(home) => PathBuf::from(home),
        Err(_) => dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".folio"),
    };

    let config_file = std::env::var("FOLIO_CONFIG")
        .map(PathBuf::from)
        .ok()
        .or_else(find_config_file);

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let mut resolved = ResolvedConfig::from_file(home, config_file, file);
    resolved.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
