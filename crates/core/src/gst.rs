//! GST calculation engine.
//!
//! Pure functions, no I/O. Amounts are `Decimal` in the currency's major
//! unit; rates are whole-number percentages (18 means 18%). Breakdowns are
//! recomputed from line items on every sync attempt and never persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default tax rate applied when a line item does not carry one.
pub const DEFAULT_TAX_RATE: u32 = 18;

/// Length of the jurisdiction (state-code) prefix of a GST identifier.
const GSTIN_STATE_PREFIX_LEN: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_rate: Option<Decimal>,
}

impl TaxLine {
    fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    fn tax(&self) -> Decimal {
        let rate = self.tax_rate.unwrap_or_else(|| Decimal::from(DEFAULT_TAX_RATE));
        self.subtotal() * rate / Decimal::ONE_HUNDRED
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub sgst: Decimal,
    pub cgst: Decimal,
    pub igst: Decimal,
}

/// Direct-to-consumer breakdown: a flat tax total with no component split.
pub fn compute_b2c(lines: &[TaxLine]) -> TaxBreakdown {
    let subtotal: Decimal = lines.iter().map(TaxLine::subtotal).sum();
    let tax_amount: Decimal = lines.iter().map(TaxLine::tax).sum();

    TaxBreakdown {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
        sgst: Decimal::ZERO,
        cgst: Decimal::ZERO,
        igst: Decimal::ZERO,
    }
}

/// Business-to-business breakdown with jurisdiction-aware component split.
///
/// Seller and buyer jurisdictions are the first two characters of their GST
/// identifiers. Matching jurisdictions split each line's tax equally into
/// SGST and CGST; differing jurisdictions put all tax into IGST. A missing
/// identifier on either side defaults to the inter-state branch — a deliberate
/// business rule with financial consequences, preserved exactly.
pub fn compute_b2b(
    lines: &[TaxLine],
    seller_gstin: Option<&str>,
    buyer_gstin: Option<&str>,
) -> TaxBreakdown {
    let subtotal: Decimal = lines.iter().map(TaxLine::subtotal).sum();
    let tax_amount: Decimal = lines.iter().map(TaxLine::tax).sum();

    let intra_state = match (state_prefix(seller_gstin), state_prefix(buyer_gstin)) {
        (Some(seller), Some(buyer)) => seller == buyer,
        _ => false,
    };

    let (sgst, cgst, igst) = if intra_state {
        let half: Decimal = lines.iter().map(|line| line.tax() / Decimal::from(2)).sum();
        (half, half, Decimal::ZERO)
    } else {
        (Decimal::ZERO, Decimal::ZERO, tax_amount)
    };

    TaxBreakdown { subtotal, tax_amount: sgst + cgst + igst, total: subtotal + sgst + cgst + igst, sgst, cgst, igst }
}

fn state_prefix(gstin: Option<&str>) -> Option<&str> {
    let value = gstin?.trim();
    if value.len() < GSTIN_STATE_PREFIX_LEN {
        return None;
    }
    value.get(..GSTIN_STATE_PREFIX_LEN)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{compute_b2b, compute_b2c, TaxLine};

    fn line(quantity: u32, unit_price: i64, tax_rate: Option<i64>) -> TaxLine {
        TaxLine {
            description: "item".to_string(),
            quantity,
            unit_price: Decimal::from(unit_price),
            tax_rate: tax_rate.map(Decimal::from),
        }
    }

    #[test]
    fn b2c_total_is_subtotal_plus_tax() {
        let lines = vec![line(2, 500, Some(18)), line(1, 250, Some(12))];
        let breakdown = compute_b2c(&lines);

        assert_eq!(breakdown.total, breakdown.subtotal + breakdown.tax_amount);
    }

    #[test]
    fn b2c_paid_order_example() {
        let lines = vec![line(2, 500, Some(18))];
        let breakdown = compute_b2c(&lines);

        assert_eq!(breakdown.subtotal, Decimal::from(1000));
        assert_eq!(breakdown.tax_amount, Decimal::from(180));
        assert_eq!(breakdown.total, Decimal::from(1180));
    }

    #[test]
    fn b2c_missing_rate_defaults_to_eighteen_percent() {
        let breakdown = compute_b2c(&[line(1, 100, None)]);

        assert_eq!(breakdown.tax_amount, Decimal::from(18));
        assert_eq!(breakdown.total, Decimal::from(118));
    }

    #[test]
    fn b2b_same_state_splits_tax_into_sgst_and_cgst() {
        let lines = vec![line(2, 1000, Some(18))];
        let breakdown = compute_b2b(&lines, Some("27AAAPL1234C1ZV"), Some("27BBBPL9999D2ZX"));

        assert_eq!(breakdown.igst, Decimal::ZERO);
        assert_eq!(breakdown.sgst, breakdown.cgst);
        assert_eq!(breakdown.sgst + breakdown.cgst, breakdown.tax_amount);
        assert_eq!(breakdown.sgst, Decimal::from(180));
    }

    #[test]
    fn b2b_cross_state_estimate_example() {
        let lines = vec![line(2, 1000, Some(18))];
        let breakdown = compute_b2b(&lines, Some("27AAAPL1234C1ZV"), Some("29AAAPL5678C3ZV"));

        assert_eq!(breakdown.subtotal, Decimal::from(2000));
        assert_eq!(breakdown.igst, Decimal::from(360));
        assert_eq!(breakdown.sgst, Decimal::ZERO);
        assert_eq!(breakdown.cgst, Decimal::ZERO);
        assert_eq!(breakdown.total, Decimal::from(2360));
    }

    #[test]
    fn b2b_missing_identifier_defaults_to_inter_state() {
        let lines = vec![line(1, 100, Some(18))];

        let missing_buyer = compute_b2b(&lines, Some("27AAAPL1234C1ZV"), None);
        assert!(missing_buyer.igst > Decimal::ZERO);
        assert_eq!(missing_buyer.sgst, Decimal::ZERO);
        assert_eq!(missing_buyer.cgst, Decimal::ZERO);

        let missing_seller = compute_b2b(&lines, None, Some("27AAAPL1234C1ZV"));
        assert!(missing_seller.igst > Decimal::ZERO);
        assert_eq!(missing_seller.sgst, Decimal::ZERO);
        assert_eq!(missing_seller.cgst, Decimal::ZERO);
    }

    #[test]
    fn b2b_tax_amount_equals_component_sum() {
        let lines = vec![line(3, 400, Some(18)), line(1, 90, Some(5))];
        let intra = compute_b2b(&lines, Some("27AAA"), Some("27BBB"));
        let inter = compute_b2b(&lines, Some("27AAA"), Some("29BBB"));

        assert_eq!(intra.tax_amount, intra.sgst + intra.cgst + intra.igst);
        assert_eq!(inter.tax_amount, inter.sgst + inter.cgst + inter.igst);
        assert_eq!(intra.total, intra.subtotal + intra.tax_amount);
        assert_eq!(inter.total, inter.subtotal + inter.tax_amount);
    }
}
