use crate::config::CleanSettings;
use crate::utils::error::{CleanError, Result};
use crate::utils::validation::{validate_delimiter, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: Option<PathBuf>,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupeConfig {
    pub key_columns: Option<Vec<String>>,
    pub valid_output: Option<PathBuf>,
    pub duplicates_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    pub max_rows_per_chunk: Option<usize>,
    pub chunk_directory: Option<PathBuf>,
    pub delimiter: Option<String>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// 設為空字串可停用 email 驗證
    pub email_column: Option<String>,
    pub date_columns: Option<Vec<String>>,
    pub unparseable_date: Option<String>,
    pub dedupe_key_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub valid_path: PathBuf,
    pub error_path: PathBuf,
    pub valid_directory: Option<PathBuf>,
    pub error_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    pub workers: Option<usize>,
    pub monitoring: Option<bool>,
}

fn parse_delimiter(field: &str, value: Option<&str>, default: u8) -> Result<u8> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => validate_delimiter(field, c),
        _ => Err(CleanError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: "Delimiter must be exactly one character".to_string(),
        }),
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CleanError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| CleanError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})；找不到的變數保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.performance.monitoring.unwrap_or(false)
    }

    /// Resolves defaults and delimiter strings into [`CleanSettings`] and validates them.
    pub fn to_settings(&self) -> Result<CleanSettings> {
        let defaults = CleanSettings::default();

        let email_column = match &self.validation.email_column {
            Some(column) if column.is_empty() => None,
            Some(column) => Some(column.clone()),
            None => defaults.email_column.clone(),
        };

        let settings = CleanSettings {
            source_file: self.source.path.clone(),
            source_delimiter: parse_delimiter(
                "source.delimiter",
                self.source.delimiter.as_deref(),
                defaults.source_delimiter,
            )?,
            delimiter: parse_delimiter(
                "split.delimiter",
                self.split.delimiter.as_deref(),
                defaults.delimiter,
            )?,
            dedupe_key_columns: self.dedupe.key_columns.clone().unwrap_or_default(),
            dedupe_valid_output: self.dedupe.valid_output.clone(),
            dedupe_duplicates_output: self.dedupe.duplicates_output.clone(),
            chunk_directory: self
                .split
                .chunk_directory
                .clone()
                .unwrap_or(defaults.chunk_directory),
            max_rows_per_chunk: self
                .split
                .max_rows_per_chunk
                .unwrap_or(defaults.max_rows_per_chunk),
            chunk_extension: self
                .split
                .extension
                .clone()
                .unwrap_or(defaults.chunk_extension),
            email_column,
            date_columns: self
                .validation
                .date_columns
                .clone()
                .unwrap_or(defaults.date_columns),
            unparseable_date: self
                .validation
                .unparseable_date
                .clone()
                .unwrap_or(defaults.unparseable_date),
            chunk_dedupe_key_columns: self
                .validation
                .dedupe_key_columns
                .clone()
                .unwrap_or_default(),
            valid_output: self.output.valid_path.clone(),
            error_output: self.output.error_path.clone(),
            valid_directory: self.output.valid_directory.clone(),
            error_directory: self.output.error_directory.clone(),
            workers: self.performance.workers.unwrap_or(defaults.workers),
        };

        settings.validate()?;
        Ok(settings)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.to_settings().map(|_| ())
    }
}
