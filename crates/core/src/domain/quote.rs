use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::gst::TaxLine;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct B2bQuoteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum B2bQuoteStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Expired,
}

impl B2bQuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_rate: Option<Decimal>,
}

impl QuoteLine {
    pub fn tax_line(&self) -> TaxLine {
        TaxLine {
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            tax_rate: self.tax_rate,
        }
    }
}

/// Bulk-purchase quote raised by a business buyer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bQuote {
    pub id: B2bQuoteId,
    pub user_id: UserId,
    pub status: B2bQuoteStatus,
    pub company_name: String,
    pub notes: Option<String>,
    pub lines: Vec<QuoteLine>,
    pub accounting_estimate_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::B2bQuoteStatus;

    #[test]
    fn quote_status_round_trips_from_storage_encoding() {
        let cases = [
            B2bQuoteStatus::Draft,
            B2bQuoteStatus::Submitted,
            B2bQuoteStatus::Approved,
            B2bQuoteStatus::Rejected,
            B2bQuoteStatus::Expired,
        ];

        for status in cases {
            assert_eq!(B2bQuoteStatus::parse(status.as_str()), Some(status));
        }
    }
}
