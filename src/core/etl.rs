use crate::core::{Pipeline, Product};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Runs extract, transform and load; any phase failing fails the run.
    pub async fn run(&self) -> Result<Vec<Product>> {
        tracing::info!("🚀 Starting ETL process");
        self.monitor.log_stats("Start");

        let products = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} products", products.len());
        self.monitor.log_stats("Extract");

        let result = self.pipeline.transform(products).await?;
        tracing::info!(
            "🔧 Transformed {} products in {:?} ({} converted, {} passed, {} cancelled)",
            result.products.len(),
            result.elapsed,
            result.converted,
            result.passed,
            result.cancelled
        );
        if result.cancelled > 0 {
            tracing::warn!(
                "⚠️ {} products skipped their delay because of shutdown",
                result.cancelled
            );
        }
        self.monitor.log_stats("Transform");

        let stored = self.pipeline.load(result).await?;
        tracing::info!("💾 Load returned {} products", stored.len());
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(stored)
    }
}
