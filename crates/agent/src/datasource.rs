use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use maildesk_core::{
    Boundary, CollaboratorError, DataSource, FieldName, LookupOutcome, RecordFields,
};

use crate::extractor::CatalogProduct;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not read data source `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse data source `{path}`: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
}

#[derive(Debug, Default, Deserialize)]
struct DataFile {
    #[serde(default)]
    orders: Vec<RecordFields>,
    #[serde(default)]
    products: Vec<RecordFields>,
    #[serde(default)]
    users: Vec<RecordFields>,
}

/// Read-only lookups against a JSON fixture file: orders, products, users.
/// Per-intent dispatch lives here so the orchestrator stays generic.
pub struct JsonDataSource {
    orders: Vec<RecordFields>,
    products: Vec<RecordFields>,
    users: Vec<RecordFields>,
}

impl JsonDataSource {
    pub fn from_json_str(path: &Path, raw: &str) -> Result<Self, DataError> {
        let file: DataFile = serde_json::from_str(raw)
            .map_err(|source| DataError::ParseFile { path: path.to_path_buf(), source })?;
        Ok(Self { orders: file.orders, products: file.products, users: file.users })
    }

    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json_str(path, &raw)
    }

    /// Product names and aliases for the extractor's catalog scan.
    pub fn catalog(&self) -> Vec<CatalogProduct> {
        self.products
            .iter()
            .filter_map(|product| {
                let name = string_field(product, "product_name")?;
                let aliases = product
                    .get("aliases")
                    .and_then(|value| value.as_array())
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|value| value.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(CatalogProduct { name, aliases })
            })
            .collect()
    }

    fn lookup_order(&self, order_id: &str) -> LookupOutcome {
        if !plausible_order_id(order_id) {
            return LookupOutcome::InvalidKey;
        }
        find_by(&self.orders, "order_id", order_id)
    }

    fn lookup_product(&self, product_name: &str) -> LookupOutcome {
        let lowercased = product_name.to_lowercase();
        self.products
            .iter()
            .find(|product| {
                string_field(product, "product_name")
                    .map(|name| name.to_lowercase() == lowercased)
                    .unwrap_or(false)
            })
            .map(|product| LookupOutcome::Found(product.clone()))
            .unwrap_or(LookupOutcome::NotFound)
    }

    fn lookup_user(&self, email: &str) -> LookupOutcome {
        find_by(&self.users, "email", email)
    }
}

#[async_trait]
impl DataSource for JsonDataSource {
    async fn lookup(
        &self,
        intent: &str,
        fields: &BTreeMap<FieldName, String>,
    ) -> Result<LookupOutcome, CollaboratorError> {
        match intent {
            "order_status" => Ok(self.lookup_order(required_field(fields, "order_id")?)),
            "stock_availability" | "product_info" => {
                Ok(self.lookup_product(required_field(fields, "product_name")?))
            }
            "password_reset" => Ok(self.lookup_user(required_field(fields, "email")?)),
            other => Err(CollaboratorError::new(
                Boundary::DataSource,
                format!("no lookup configured for intent `{other}`"),
            )),
        }
    }
}

fn required_field<'a>(
    fields: &'a BTreeMap<FieldName, String>,
    name: &str,
) -> Result<&'a str, CollaboratorError> {
    fields.get(&FieldName::new(name)).map(String::as_str).ok_or_else(|| {
        CollaboratorError::new(
            Boundary::DataSource,
            format!("lookup invoked without required field `{name}`"),
        )
    })
}

fn find_by(records: &[RecordFields], key: &str, value: &str) -> LookupOutcome {
    records
        .iter()
        .find(|record| string_field(record, key).as_deref() == Some(value))
        .map(|record| LookupOutcome::Found(record.clone()))
        .unwrap_or(LookupOutcome::NotFound)
}

fn string_field(record: &RecordFields, key: &str) -> Option<String> {
    record.get(key).and_then(|value| value.as_str()).map(str::to_string)
}

/// Order-id shape check: `#`-prefixed, `ORD-`-prefixed, all digits, or at
/// least four characters with a digit in them. Anything else cannot exist
/// in the order book, so it is an invalid key rather than a miss.
fn plausible_order_id(order_id: &str) -> bool {
    if order_id.is_empty() {
        return false;
    }
    if order_id.starts_with('#') || order_id.to_uppercase().starts_with("ORD-") {
        return true;
    }
    if order_id.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    order_id.len() >= 4 && order_id.chars().any(|c| c.is_ascii_digit())
}
