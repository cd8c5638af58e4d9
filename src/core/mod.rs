pub mod etl;
pub mod product_pipeline;
pub mod transform_stage;

pub use crate::domain::model::{ItemStatus, PricedItem, Product, TransformResult, TransformedProduct};
pub use crate::domain::ports::{ConfigProvider, DelayMode, Pipeline, ProductRepository, Storage};
pub use crate::utils::error::Result;
