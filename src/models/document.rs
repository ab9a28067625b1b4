use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Quotation {
    pub id: Uuid,
    pub quotation_number: String,
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProformaInvoice {
    pub id: Uuid,
    pub proforma_number: String,
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Item rows share one shape across the three document tables; only the
// parent column name differs, so a single struct covers all of them.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DocumentItem {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ItemPayload {
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
}

impl ItemPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity <= Decimal::ZERO {
            return Err(format!(
                "item '{}': quantity must be positive",
                self.description
            ));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(format!(
                "item '{}': unit price cannot be negative",
                self.description
            ));
        }
        if self.discount_percent < Decimal::ZERO || self.discount_percent > Decimal::ONE_HUNDRED {
            return Err(format!(
                "item '{}': discount must be between 0 and 100 percent",
                self.description
            ));
        }
        if self.tax_rate < Decimal::ZERO {
            return Err(format!(
                "item '{}': tax rate cannot be negative",
                self.description
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentPayload {
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    // valid_until for quotations/proformas, due_date for invoices
    pub valid_until: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<ItemPayload>,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertPayload {
    // "proforma" or "invoice"; defaults to invoice when absent
    pub target: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct QuotationDetail {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub items: Vec<DocumentItem>,
}

#[derive(Debug, Serialize)]
pub struct ProformaDetail {
    #[serde(flatten)]
    pub proforma: ProformaInvoice,
    pub items: Vec<DocumentItem>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<DocumentItem>,
}

pub const QUOTATION_STATUSES: &[&str] =
    &["draft", "sent", "accepted", "rejected", "expired", "converted"];
pub const PROFORMA_STATUSES: &[&str] = &["draft", "sent", "converted", "expired", "cancelled"];
pub const INVOICE_STATUSES: &[&str] =
    &["draft", "sent", "partially_paid", "paid", "overdue", "cancelled"];

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item() -> ItemPayload {
        ItemPayload {
            product_id: None,
            description: "widget".to_string(),
            quantity: dec!(2),
            unit_price: dec!(150),
            discount_percent: dec!(10),
            tax_rate: dec!(16),
        }
    }

    #[test]
    fn well_formed_item_passes() {
        assert!(item().validate().is_ok());
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        for quantity in [dec!(0), dec!(-1)] {
            let bad = ItemPayload { quantity, ..item() };
            assert!(bad.validate().is_err());
        }
    }

    #[test]
    fn negative_unit_price_is_rejected() {
        let bad = ItemPayload {
            unit_price: dec!(-0.01),
            ..item()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn discount_outside_percentage_range_is_rejected() {
        for discount_percent in [dec!(-5), dec!(150)] {
            let bad = ItemPayload {
                discount_percent,
                ..item()
            };
            assert!(bad.validate().is_err());
        }
    }

    #[test]
    fn negative_tax_rate_is_rejected() {
        let bad = ItemPayload {
            tax_rate: dec!(-16),
            ..item()
        };
        assert!(bad.validate().is_err());
    }
}
