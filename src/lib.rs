pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::repository::FileRepository;
pub use config::cli::LocalStorage;
pub use config::toml_config::TomlConfig;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{
    etl::EtlEngine,
    product_pipeline::ProductPipeline,
    transform_stage::{ParallelTransformStage, StageSettings},
};
pub use domain::model::{ItemStatus, PricedItem, Product, Rating, TransformedProduct};
pub use domain::ports::DelayMode;
pub use utils::error::{EtlError, Result};
