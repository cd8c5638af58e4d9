use crate::domain::model::{Product, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// How a selected item waits out its artificial delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Hand the item to a timer task; the worker moves on at once.
    #[default]
    Scheduled,
    /// The worker waits the delay out itself before taking more work.
    WorkerBound,
}

pub trait ConfigProvider: Send + Sync {
    fn api_endpoint(&self) -> &str;
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[String];
    fn parallelism(&self) -> usize;
    fn conversion_rate(&self) -> f64;
    fn delay(&self) -> Duration;
    fn delay_mode(&self) -> DelayMode;
    fn exclude_ids(&self) -> &[i64];

    fn request_timeout(&self) -> Option<Duration> {
        None
    }

    fn request_headers(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// Persists a whole batch in one call and hands back what was stored.
pub trait ProductRepository: Send + Sync {
    fn save_all(
        &self,
        products: Vec<Product>,
    ) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Product>>;
    async fn transform(&self, data: Vec<Product>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<Vec<Product>>;
}
