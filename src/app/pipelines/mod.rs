pub mod product_pipeline;
