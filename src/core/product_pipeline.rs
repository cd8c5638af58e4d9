pub use crate::app::pipelines::product_pipeline::ProductPipeline;
