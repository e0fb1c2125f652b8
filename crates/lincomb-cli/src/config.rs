//! TOML configuration and its merge with command-line options.

use std::path::{Path, PathBuf};

use anyhow::Context;
use lincomb_core::{JobSpec, Strategy};
use serde::Deserialize;

/// Top-level run configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// How blocks move between ranks.
#[derive(Debug, Default, Deserialize)]
pub struct ExchangeConfig {
    /// "collective" (default) or "message".
    #[serde(default)]
    pub strategy: Strategy,
}

/// In-process world settings.
#[derive(Debug, Default, Deserialize)]
pub struct WorldConfig {
    /// Number of ranks. Default: available parallelism.
    pub workers: Option<usize>,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Result file, opened in append mode (default: "resultado.txt").
    #[serde(default = "default_output_file")]
    pub file: String,
    /// Whether to append the result to `file` (default: true).
    #[serde(default = "default_true")]
    pub save: bool,
    /// Whether to print A, B and C on the coordinator (default: false).
    #[serde(default)]
    pub print_matrices: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
            save: true,
            print_matrices: false,
        }
    }
}

fn default_output_file() -> String {
    "resultado.txt".into()
}
fn default_true() -> bool {
    true
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub strategy: Option<Strategy>,
    pub workers: Option<usize>,
    pub output: Option<PathBuf>,
    pub no_save: bool,
    pub print: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub job: JobSpec,
    pub strategy: Strategy,
    pub workers: usize,
    pub output: PathBuf,
    pub save: bool,
    pub print: bool,
}

impl Settings {
    /// Merge defaults, the optional config file and command-line overrides.
    pub fn resolve(
        job: JobSpec,
        config_path: Option<&Path>,
        overrides: Overrides,
    ) -> anyhow::Result<Self> {
        let file = match config_path {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };
        Self::merge(job, file, overrides)
    }

    fn merge(job: JobSpec, file: FileConfig, overrides: Overrides) -> anyhow::Result<Self> {
        let workers = overrides
            .workers
            .or(file.world.workers)
            .unwrap_or_else(default_workers);
        if workers == 0 {
            anyhow::bail!("worker count must be positive");
        }
        job.validate()?;

        Ok(Self {
            job,
            strategy: overrides.strategy.unwrap_or(file.exchange.strategy),
            workers,
            output: overrides
                .output
                .unwrap_or_else(|| PathBuf::from(&file.output.file)),
            save: file.output.save && !overrides.no_save,
            print: file.output.print_matrices || overrides.print,
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Load and parse a TOML run configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}
