use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the transform stage needs from an item: a stable id for the
/// selection predicate and the one field it mutates.
pub trait PricedItem: Send + 'static {
    fn id(&self) -> i64;
    fn price(&self) -> f64;
    fn set_price(&mut self, price: f64);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u64,
}

impl Product {
    pub fn new(id: i64, price: f64) -> Self {
        Self {
            id,
            price,
            title: None,
            description: None,
            category: None,
            image: None,
            rating: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl PricedItem for Product {
    fn id(&self) -> i64 {
        self.id
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn set_price(&mut self, price: f64) {
        self.price = price;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not selected, emitted untouched.
    Passed,
    /// Selected, converted and the delay ran to completion.
    Converted,
    /// Selected and converted, but shutdown cut the delay short.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TransformedProduct<T = Product> {
    pub item: T,
    pub worker: usize,
    pub status: ItemStatus,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub products: Vec<TransformedProduct>,
    pub converted: usize,
    pub passed: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl TransformResult {
    pub fn from_products(products: Vec<TransformedProduct>, elapsed: Duration) -> Self {
        let count = |status: ItemStatus| products.iter().filter(|p| p.status == status).count();
        Self {
            converted: count(ItemStatus::Converted),
            passed: count(ItemStatus::Passed),
            cancelled: count(ItemStatus::Cancelled),
            products,
            elapsed,
        }
    }

    /// Ids whose delay was interrupted, in batch order.
    pub fn cancelled_ids(&self) -> Vec<i64> {
        self.products
            .iter()
            .filter(|p| p.status == ItemStatus::Cancelled)
            .map(|p| p.item.id)
            .collect()
    }

    pub fn into_items(self) -> Vec<Product> {
        self.products.into_iter().map(|p| p.item).collect()
    }
}
