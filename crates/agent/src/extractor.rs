use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;

use maildesk_core::{CollaboratorError, EntityExtractor, FieldName};

/// One product the extractor can recognize by official name or alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogProduct {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Pattern-based entity extraction. Strict shapes plus a catalog lookup
/// keep false positives out: an order id must contain a digit so plain
/// English words never match, and product mentions normalize to the
/// official catalog name.
pub struct PatternExtractor {
    labeled_order_id: Regex,
    bare_token: Regex,
    email: Regex,
    catalog: Vec<CatalogProduct>,
}

impl PatternExtractor {
    pub fn new(catalog: Vec<CatalogProduct>) -> Result<Self, regex::Error> {
        Ok(Self {
            labeled_order_id: Regex::new(
                r"(?i)(?:#|\border\b\s*:?\s*|\bid\b\s*:?\s*|\bref\b\s*:?\s*)([A-Za-z0-9][A-Za-z0-9-]{3,})",
            )?,
            bare_token: Regex::new(r"^[A-Za-z0-9-]+$")?,
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            catalog,
        })
    }

    fn extract_order_id(&self, text: &str) -> Option<String> {
        // Labeled ids first (high confidence): #12345, Order: 12345, ref A-99.
        if let Some(captures) = self.labeled_order_id.captures(text) {
            return Some(captures[1].to_string());
        }

        // Standalone tokens of plausible shape. Requiring a digit keeps
        // ordinary words like "Where" from matching.
        for token in text.split_whitespace() {
            let trimmed = token.trim_matches(|c: char| ".,?!".contains(c));
            if trimmed.len() >= 4
                && trimmed.chars().any(|c| c.is_ascii_digit())
                && self.bare_token.is_match(trimmed)
            {
                return Some(trimmed.to_string());
            }
        }
        None
    }

    fn extract_email(&self, text: &str) -> Option<String> {
        self.email.find(text).map(|found| found.as_str().to_string())
    }

    fn extract_product(&self, text: &str) -> Option<String> {
        let lowercased = text.to_lowercase();
        for product in &self.catalog {
            if lowercased.contains(&product.name.to_lowercase()) {
                return Some(product.name.clone());
            }
            for alias in &product.aliases {
                if lowercased.contains(&alias.to_lowercase()) {
                    return Some(product.name.clone());
                }
            }
        }
        None
    }
}

#[async_trait]
impl EntityExtractor for PatternExtractor {
    async fn extract(
        &self,
        text: &str,
        fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>, CollaboratorError> {
        let mut extracted = BTreeMap::new();
        for field in fields {
            let value = match field.as_str() {
                "order_id" => self.extract_order_id(text),
                "email" => self.extract_email(text),
                "product_name" => self.extract_product(text),
                // Fields this extractor has no pattern for stay absent.
                _ => None,
            };
            if let Some(value) = value {
                extracted.insert(field.clone(), value);
            }
        }
        Ok(extracted)
    }
}
