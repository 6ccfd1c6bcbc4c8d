use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub segment: Option<String>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price: Decimal,
    pub stock_on_hand: i64,
    pub weight_value: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub accounting_item_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Maps a locally stored weight unit onto the unit labels the accounting
/// service accepts. Anything unrecognized falls back to "units".
pub fn remote_weight_unit(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "g" | "gram" | "grams" => "grams",
        "kg" | "kilogram" | "kilograms" => "kilograms",
        "ml" | "milliliter" | "milliliters" => "milliliters",
        "l" | "liter" | "liters" | "litre" | "litres" => "liters",
        _ => "units",
    }
}
