use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::ProductVariant;
use crate::error::CacheError;

pub const KEY_PREFIX: &str = "variant:";

pub const FIELD_ID: &str = "id";
pub const FIELD_QUANTITY: &str = "quantity";
pub const FIELD_PRICE: &str = "price";
pub const FIELD_IMAGE: &str = "image";
pub const FIELD_PRODUCT_NAME: &str = "productName";
pub const FIELD_PRODUCT_ID: &str = "productId";

pub fn stock_key(variant_id: i64) -> String {
    format!("{}{}", KEY_PREFIX, variant_id)
}

pub fn parse_stock_key(key: &str) -> Option<i64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

/// Cached availability of one variant. `quantity` is the fast-path authority
/// for reservations and may run ahead of the durable quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct StockRecord {
    pub variant_id: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub image: String,
    pub product_name: String,
    pub product_id: i64,
}

impl StockRecord {
    /// Hydrates from the durable row, net of quantities still held by drafts.
    pub fn from_variant(variant: &ProductVariant, reserved: i64) -> Self {
        Self {
            variant_id: variant.id,
            quantity: variant.quantity - reserved,
            price: variant.price,
            image: variant.image.clone(),
            product_name: variant.product_name.clone(),
            product_id: variant.product_id,
        }
    }

    pub fn key(&self) -> String {
        stock_key(self.variant_id)
    }

    pub fn to_fields(&self) -> HashMap<String, String> {
        HashMap::from([
            (FIELD_ID.to_string(), self.variant_id.to_string()),
            (FIELD_QUANTITY.to_string(), self.quantity.to_string()),
            (FIELD_PRICE.to_string(), self.price.to_string()),
            (FIELD_IMAGE.to_string(), self.image.clone()),
            (FIELD_PRODUCT_NAME.to_string(), self.product_name.clone()),
            (FIELD_PRODUCT_ID.to_string(), self.product_id.to_string()),
        ])
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, CacheError> {
        Ok(Self {
            variant_id: parse_field(fields, FIELD_ID)?,
            quantity: parse_field(fields, FIELD_QUANTITY)?,
            price: parse_field(fields, FIELD_PRICE)?,
            image: fields.get(FIELD_IMAGE).cloned().unwrap_or_default(),
            product_name: fields.get(FIELD_PRODUCT_NAME).cloned().unwrap_or_default(),
            product_id: parse_field(fields, FIELD_PRODUCT_ID)?,
        })
    }
}

fn parse_field<T: FromStr>(fields: &HashMap<String, String>, name: &str) -> Result<T, CacheError> {
    let raw = fields
        .get(name)
        .ok_or_else(|| CacheError::Script(format!("missing field {}", name)))?;
    raw.parse()
        .map_err(|_| CacheError::Script(format!("unparsable field {}: {:?}", name, raw)))
}
