pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::{ConfigProvider, DelayMode};
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{
    validate_output_formats, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
#[cfg(feature = "cli")]
use std::time::Duration;

pub const DEFAULT_API_ENDPOINT: &str = "https://fakestoreapi.com/products";
pub const MAX_CONVERSION_RATE: f64 = 1_000_000.0;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "price-etl")]
#[command(about = "Fetch products, convert prices in parallel and persist the batch")]
pub struct CliConfig {
    /// Read settings from a TOML file instead of these flags
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, default_value = DEFAULT_API_ENDPOINT)]
    pub api_endpoint: String,

    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, value_delimiter = ',', default_value = "json")]
    pub output_formats: Vec<String>,

    /// Worker count, defaults to the number of CPU cores
    #[arg(long)]
    pub parallelism: Option<usize>,

    #[arg(long, default_value_t = crate::core::transform_stage::DEFAULT_CONVERSION_RATE)]
    pub conversion_rate: f64,

    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    #[arg(long, value_enum, default_value_t = DelayMode::Scheduled)]
    pub delay_mode: DelayMode,

    /// Product ids dropped from the saved batch before it is printed
    #[arg(long, value_delimiter = ',')]
    pub exclude_ids: Vec<i64>,

    /// Only fetch and print products, skip transform and persistence
    #[arg(long)]
    pub fetch_only: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process CPU and memory per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.output_formats
    }

    fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(num_cpus::get)
    }

    fn conversion_rate(&self) -> f64 {
        self.conversion_rate
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn delay_mode(&self) -> DelayMode {
        self.delay_mode
    }

    fn exclude_ids(&self) -> &[i64] {
        &self.exclude_ids
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("api_endpoint", &self.api_endpoint)?;
        validate_path("output_path", &self.output_path)?;
        validate_output_formats("output_formats", &self.output_formats)?;
        validate_positive_number("parallelism", self.parallelism(), 1)?;
        validate_range(
            "conversion_rate",
            self.conversion_rate,
            0.0,
            MAX_CONVERSION_RATE,
        )?;
        Ok(())
    }
}
