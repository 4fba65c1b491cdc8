// src/catalog.rs

use crate::part_detection::PartName;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use tracing::info;

/// Price-catalog capability: `(brand, model, part) -> unit price`.
/// `Ok(None)` means the row is absent; an `Err` means the catalog itself
/// is unavailable.
pub trait PriceCatalog: Send + Sync {
    fn lookup(&self, brand: &str, model: &str, part: PartName) -> Result<Option<f64>>;
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    brand: String,
    model: String,
    part: String,
    price: f64,
}

/// Catalog loaded from a YAML table dump, keyed in memory.
pub struct FileCatalog {
    prices: HashMap<(String, String, String), f64>,
}

impl FileCatalog {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read catalog {path}"))?;
        let rows: Vec<CatalogRow> = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse catalog {path}"))?;

        info!("✓ Price catalog loaded: {} rows", rows.len());
        Ok(Self::from_rows(rows.into_iter().map(|r| {
            (r.brand, r.model, r.part, r.price)
        })))
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (String, String, String, f64)>) -> Self {
        let prices = rows
            .into_iter()
            .map(|(brand, model, part, price)| ((brand, model, part), price))
            .collect();
        Self { prices }
    }
}

impl PriceCatalog for FileCatalog {
    fn lookup(&self, brand: &str, model: &str, part: PartName) -> Result<Option<f64>> {
        let key = (
            brand.to_string(),
            model.to_string(),
            part.as_str().to_string(),
        );
        Ok(self.prices.get(&key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FileCatalog {
        FileCatalog::from_rows([
            ("Toyota".into(), "Corolla".into(), "Door".into(), 200.0),
            ("Toyota".into(), "Corolla".into(), "Light".into(), 80.0),
        ])
    }

    #[test]
    fn test_lookup_hit() {
        let price = catalog().lookup("Toyota", "Corolla", PartName::Door).unwrap();
        assert_eq!(price, Some(200.0));
    }

    #[test]
    fn test_lookup_absent_row() {
        let price = catalog()
            .lookup("Toyota", "Corolla", PartName::Bonnet)
            .unwrap();
        assert_eq!(price, None);

        let price = catalog().lookup("Honda", "Civic", PartName::Door).unwrap();
        assert_eq!(price, None);
    }
}
