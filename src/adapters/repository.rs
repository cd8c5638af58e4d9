use crate::core::{Product, ProductRepository, Storage};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;

pub const JSON_FILE: &str = "products.json";
pub const CSV_FILE: &str = "products.csv";

/// Flat CSV view of a product; nested rating is split into two columns.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    title: &'a str,
    price: f64,
    category: &'a str,
    rating_rate: Option<f64>,
    rating_count: Option<u64>,
}

impl<'a> From<&'a Product> for CsvRow<'a> {
    fn from(p: &'a Product) -> Self {
        Self {
            id: p.id,
            title: p.title.as_deref().unwrap_or(""),
            price: p.price,
            category: p.category.as_deref().unwrap_or(""),
            rating_rate: p.rating.as_ref().map(|r| r.rate),
            rating_count: p.rating.as_ref().map(|r| r.count),
        }
    }
}

/// Writes each batch as one file per output format through a [`Storage`].
pub struct FileRepository<S: Storage> {
    storage: S,
    formats: Vec<String>,
}

impl<S: Storage> FileRepository<S> {
    pub fn new(storage: S, formats: Vec<String>) -> Self {
        Self { storage, formats }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn encode(&self, format: &str, products: &[Product]) -> Result<(&'static str, Vec<u8>)> {
        match format {
            "json" => {
                let data = serde_json::to_vec_pretty(products)?;
                Ok((JSON_FILE, data))
            }
            "csv" => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                for product in products {
                    writer.serialize(CsvRow::from(product))?;
                }
                let data = writer.into_inner().map_err(|e| e.into_error())?;
                Ok((CSV_FILE, data))
            }
            other => Err(EtlError::PersistenceError {
                message: format!("unsupported output format '{}'", other),
            }),
        }
    }
}

impl<S: Storage> ProductRepository for FileRepository<S> {
    async fn save_all(&self, products: Vec<Product>) -> Result<Vec<Product>> {
        for format in &self.formats {
            let (file, data) = self.encode(format, &products)?;
            tracing::debug!("Writing {} ({} bytes)", file, data.len());
            self.storage
                .write_file(file, &data)
                .await
                .map_err(|e| EtlError::PersistenceError {
                    message: format!("writing {}: {}", file, e),
                })?;
        }

        tracing::info!(
            "💾 Saved batch of {} products at {}",
            products.len(),
            chrono::Utc::now().to_rfc3339()
        );
        Ok(products)
    }
}
