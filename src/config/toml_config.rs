use crate::core::transform_stage::{DEFAULT_CONVERSION_RATE, DEFAULT_DELAY};
use crate::core::{ConfigProvider, DelayMode};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_output_formats, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    pub parallelism: Option<usize>,
    pub conversion_rate: Option<f64>,
    pub delay_ms: Option<u64>,
    pub delay_mode: Option<DelayMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,
    #[serde(default)]
    pub exclude_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

fn default_output_formats() -> Vec<String> {
    vec!["json".to_string()]
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_KEY})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn api_endpoint(&self) -> &str {
        &self.source.endpoint
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.load.output_formats
    }

    fn parallelism(&self) -> usize {
        self.transform.parallelism.unwrap_or_else(num_cpus::get)
    }

    fn conversion_rate(&self) -> f64 {
        self.transform
            .conversion_rate
            .unwrap_or(DEFAULT_CONVERSION_RATE)
    }

    fn delay(&self) -> Duration {
        self.transform
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DELAY)
    }

    fn delay_mode(&self) -> DelayMode {
        self.transform.delay_mode.unwrap_or_default()
    }

    fn exclude_ids(&self) -> &[i64] {
        &self.load.exclude_ids
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.source.timeout_seconds.map(Duration::from_secs)
    }

    fn request_headers(&self) -> Option<&HashMap<String, String>> {
        self.source.headers.as_ref()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_url("source.endpoint", &self.source.endpoint)?;
        validate_path("load.output_path", &self.load.output_path)?;
        validate_output_formats("load.output_formats", &self.load.output_formats)?;
        if let Some(parallelism) = self.transform.parallelism {
            validate_positive_number("transform.parallelism", parallelism, 1)?;
        }
        if let Some(rate) = self.transform.conversion_rate {
            validate_range(
                "transform.conversion_rate",
                rate,
                0.0,
                crate::config::MAX_CONVERSION_RATE,
            )?;
        }
        Ok(())
    }
}
