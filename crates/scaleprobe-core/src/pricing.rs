//! Static machine-type price table.
//!
//! Loaded once by the process owner before any run starts and shared
//! read-only (behind an `Arc`) with every scorer.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigResult, read_file};

/// Hourly price per machine type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    prices: HashMap<String, f64>,
}

impl PriceTable {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }

    /// Parse a `[prices]` TOML table.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let table = Self::from_toml_str(&read_file(path)?)?;
        debug!(?path, entries = table.prices.len(), "price table loaded");
        Ok(table)
    }

    /// Builder-style insert, mostly for tests.
    pub fn with_price(mut self, machine_type: &str, price: f64) -> Self {
        self.prices.insert(machine_type.to_string(), price);
        self
    }

    /// Price of a machine type; unknown types cost 0.0.
    pub fn price_of(&self, machine_type: &str) -> f64 {
        match self.prices.get(machine_type) {
            Some(p) => *p,
            None => {
                debug!(%machine_type, "no price for machine type, using 0");
                0.0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
