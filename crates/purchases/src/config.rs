//! Store configuration: which product ids to request at startup.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use storefront_core::ProductId;

use crate::error::ConfigError;

/// Path to a JSON file of the form `{"product_ids": ["a", "b"]}`.
pub const PRODUCTS_FILE_ENV: &str = "STOREFRONT_PRODUCTS_FILE";

/// Comma-separated product ids, used when no file is configured.
pub const PRODUCT_IDS_ENV: &str = "STOREFRONT_PRODUCT_IDS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Ids requested from the catalog service.
    #[serde(default)]
    pub product_ids: BTreeSet<ProductId>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, id: ProductId) -> Self {
        self.product_ids.insert(id);
        self
    }

    pub fn with_products(mut self, ids: impl IntoIterator<Item = ProductId>) -> Self {
        self.product_ids.extend(ids);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse a comma-separated id list.
    ///
    /// Empty segments (e.g. a trailing comma) are skipped. A segment holding
    /// only whitespace is a blank id and fails with
    /// [`ConfigError::InvalidProductId`].
    pub fn from_id_list(list: &str) -> Result<Self, ConfigError> {
        let product_ids = list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(ProductId::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { product_ids })
    }

    /// Load from the process environment (see [`PRODUCTS_FILE_ENV`] and
    /// [`PRODUCT_IDS_ENV`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    ///
    /// The file variable wins over the id list. With neither set, the config
    /// is empty and a warning is logged.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup(PRODUCTS_FILE_ENV) {
            return Self::from_file(path);
        }
        if let Some(list) = lookup(PRODUCT_IDS_ENV) {
            return Self::from_id_list(&list);
        }

        warn!(
            "neither {} nor {} set; no products will be requested",
            PRODUCTS_FILE_ENV, PRODUCT_IDS_ENV
        );
        Ok(Self::default())
    }
}
