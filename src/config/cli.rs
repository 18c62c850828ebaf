use crate::config::toml_config::TomlConfig;
use crate::config::CleanSettings;
use crate::utils::error::Result;
use crate::utils::validation::{validate_delimiter, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "chunk-etl")]
#[command(about = "Chunked CSV cleaning: dedupe, split, validate and merge")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override monitoring setting from config
    #[arg(long, global = true)]
    pub monitor: Option<bool>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Write the run report as pretty JSON to this path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Remove duplicate rows from the source file
    Dedupe(DedupeArgs),
    /// Split a CSV file into numbered chunks
    Split(SplitArgs),
    /// Clean every chunk and merge into one valid and one error file
    Clean(CleanArgs),
    /// Clean every chunk into per-chunk files under two folders
    CleanToFolders(CleanToFoldersArgs),
    /// Concatenate a folder of chunks into one file
    Combine(CombineArgs),
    /// Run dedupe, split and clean in order
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DedupeArgs {
    /// Source CSV file
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub source_delimiter: Option<char>,

    /// Key columns, comma separated
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,

    #[arg(long)]
    pub valid_output: Option<PathBuf>,

    #[arg(long)]
    pub duplicates_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct SplitArgs {
    /// File to split; defaults to the configured source file
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub source_delimiter: Option<char>,

    #[arg(long)]
    pub rows: Option<usize>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Rule and worker overrides shared by the cleaning commands.
#[derive(Debug, Clone, Default, Args)]
pub struct RuleArgs {
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Column holding the email address; empty string disables the check
    #[arg(long)]
    pub email_column: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub date_columns: Option<Vec<String>>,

    /// In-chunk dedupe key columns, comma separated
    #[arg(long, value_delimiter = ',')]
    pub dedupe_keys: Option<Vec<String>>,

    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct CleanArgs {
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long)]
    pub valid_output: Option<PathBuf>,

    #[arg(long)]
    pub error_output: Option<PathBuf>,

    #[command(flatten)]
    pub rules: RuleArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CleanToFoldersArgs {
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long)]
    pub valid_dir: PathBuf,

    #[arg(long)]
    pub error_dir: PathBuf,

    #[command(flatten)]
    pub rules: RuleArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CombineArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long)]
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub rules: RuleArgs,
}

impl RuleArgs {
    fn apply(&self, settings: &mut CleanSettings) -> Result<()> {
        if let Some(delimiter) = self.delimiter {
            settings.delimiter = validate_delimiter("delimiter", delimiter)?;
        }
        if let Some(column) = &self.email_column {
            settings.email_column = Some(column.clone()).filter(|c| !c.is_empty());
        }
        if let Some(columns) = &self.date_columns {
            settings.date_columns = columns.clone();
        }
        if let Some(keys) = &self.dedupe_keys {
            settings.chunk_dedupe_key_columns = keys.clone();
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        Ok(())
    }
}

impl Cli {
    /// Loads the TOML file (or defaults), applies the command's overrides and
    /// validates the result. The flag is whether monitoring is enabled.
    pub fn settings(&self) -> Result<(CleanSettings, bool)> {
        let (mut settings, monitoring) = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading configuration from: {}", path.display());
                let config = TomlConfig::from_file(path)?;
                (config.to_settings()?, config.monitoring_enabled())
            }
            None => (CleanSettings::default(), false),
        };

        self.apply_overrides(&mut settings)?;
        settings.validate()?;
        Ok((settings, self.monitor.unwrap_or(monitoring)))
    }

    fn apply_overrides(&self, settings: &mut CleanSettings) -> Result<()> {
        match &self.command {
            Command::Dedupe(args) => {
                if let Some(input) = &args.input {
                    settings.source_file = Some(input.clone());
                }
                if let Some(delimiter) = args.source_delimiter {
                    settings.source_delimiter = validate_delimiter("source_delimiter", delimiter)?;
                }
                if !args.keys.is_empty() {
                    settings.dedupe_key_columns = args.keys.clone();
                }
                if let Some(path) = &args.valid_output {
                    settings.dedupe_valid_output = Some(path.clone());
                }
                if let Some(path) = &args.duplicates_output {
                    settings.dedupe_duplicates_output = Some(path.clone());
                }
            }
            Command::Split(args) => {
                if let Some(input) = &args.input {
                    settings.source_file = Some(input.clone());
                }
                if let Some(delimiter) = args.source_delimiter {
                    settings.source_delimiter = validate_delimiter("source_delimiter", delimiter)?;
                }
                if let Some(rows) = args.rows {
                    settings.max_rows_per_chunk = rows;
                }
                if let Some(dir) = &args.output_dir {
                    settings.chunk_directory = dir.clone();
                }
                // 單獨切檔時不做去重
                settings.dedupe_key_columns.clear();
            }
            Command::Clean(args) => {
                if let Some(dir) = &args.input_dir {
                    settings.chunk_directory = dir.clone();
                }
                if let Some(path) = &args.valid_output {
                    settings.valid_output = path.clone();
                }
                if let Some(path) = &args.error_output {
                    settings.error_output = path.clone();
                }
                settings.valid_directory = None;
                settings.error_directory = None;
                args.rules.apply(settings)?;
            }
            Command::CleanToFolders(args) => {
                if let Some(dir) = &args.input_dir {
                    settings.chunk_directory = dir.clone();
                }
                settings.valid_directory = Some(args.valid_dir.clone());
                settings.error_directory = Some(args.error_dir.clone());
                args.rules.apply(settings)?;
            }
            Command::Combine(args) => {
                if let Some(delimiter) = args.delimiter {
                    settings.delimiter = validate_delimiter("delimiter", delimiter)?;
                }
            }
            Command::Run(args) => args.rules.apply(settings)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::CleanError;

    #[test]
    fn test_clean_overrides() {
        let cli = Cli::parse_from([
            "chunk-etl",
            "clean",
            "--input-dir",
            "parts",
            "--valid-output",
            "ok.csv",
            "--email-column",
            "",
            "--dedupe-keys",
            "login_id,mail_address",
            "--workers",
            "2",
        ]);
        let (settings, monitoring) = cli.settings().unwrap();

        assert!(!monitoring);
        assert_eq!(settings.chunk_directory, PathBuf::from("parts"));
        assert_eq!(settings.valid_output, PathBuf::from("ok.csv"));
        assert_eq!(settings.email_column, None);
        assert_eq!(settings.chunk_dedupe_key_columns, vec!["login_id", "mail_address"]);
        assert_eq!(settings.workers, 2);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["chunk-etl", "run", "--monitor", "true", "-v"]);
        assert!(cli.verbose);
        assert!(cli.settings().unwrap().1);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["chunk-etl", "split", "--rows", "0"]);
        assert!(matches!(
            cli.settings(),
            Err(CleanError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::parse_from(["chunk-etl", "--config", "/nonexistent/etl.toml", "run"]);
        assert!(matches!(cli.settings(), Err(CleanError::SourceNotFound { .. })));
    }
}
