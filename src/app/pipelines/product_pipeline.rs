use crate::core::transform_stage::{ParallelTransformStage, StageSettings};
use crate::core::{ConfigProvider, Pipeline, Product, ProductRepository, TransformResult};
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fetches products over HTTP, converts prices in parallel and saves the
/// ordered batch through a [`ProductRepository`].
pub struct ProductPipeline<R: ProductRepository, C: ConfigProvider> {
    pub(crate) repository: R,
    pub(crate) config: C,
    pub(crate) client: Client,
    stage: ParallelTransformStage,
}

impl<R: ProductRepository, C: ConfigProvider> ProductPipeline<R, C> {
    pub fn new(repository: R, config: C) -> Self {
        let stage = ParallelTransformStage::new(StageSettings::from_config(&config));
        Self {
            repository,
            config,
            client: Client::new(),
            stage,
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.stage = self.stage.with_shutdown(shutdown);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Plain product listing: fetch only, nothing converted or saved.
    pub async fn fetch_only(&self) -> Result<Vec<Product>> {
        self.extract().await
    }

    async fn fetch(&self) -> Result<Vec<Product>> {
        let endpoint = self.config.api_endpoint();
        tracing::debug!("Making API request to: {}", endpoint);

        let mut request = self.client.get(endpoint);
        if let Some(headers) = self.config.request_headers() {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        if let Some(timeout) = self.config.request_timeout() {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            return Err(EtlError::FetchStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let products: Vec<Product> = response.json().await?;
        Ok(products)
    }
}

#[async_trait::async_trait]
impl<R: ProductRepository, C: ConfigProvider> Pipeline for ProductPipeline<R, C> {
    async fn extract(&self) -> Result<Vec<Product>> {
        let shutdown = self.stage.shutdown_token();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::warn!("🛑 Shutdown requested while fetching products");
                Err(EtlError::Cancelled {
                    phase: "extract".to_string(),
                })
            }
            fetched = self.fetch() => fetched,
        }
    }

    async fn transform(&self, data: Vec<Product>) -> Result<TransformResult> {
        let settings = self.stage.settings();
        tracing::info!(
            "🔧 Converting {} products with {} workers (rate {}, delay {:?})",
            data.len(),
            settings.parallelism,
            settings.conversion_rate,
            settings.delay
        );

        let start = Instant::now();
        let products = self.stage.run(data).await?;
        Ok(TransformResult::from_products(products, start.elapsed()))
    }

    async fn load(&self, result: TransformResult) -> Result<Vec<Product>> {
        let cancelled = result.cancelled_ids();
        if !cancelled.is_empty() {
            tracing::warn!(
                "⚠️ Saving {} products whose delay was cut short by shutdown: {:?}",
                cancelled.len(),
                cancelled
            );
        }
        let stored = self.repository.save_all(result.into_items()).await?;

        let exclude = self.config.exclude_ids();
        if exclude.is_empty() {
            return Ok(stored);
        }
        let before = stored.len();
        let visible: Vec<Product> = stored
            .into_iter()
            .filter(|p| !exclude.contains(&p.id))
            .collect();
        tracing::debug!(
            "Excluded {} stored products from the response",
            before - visible.len()
        );
        Ok(visible)
    }
}
