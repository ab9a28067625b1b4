use chrono::NaiveDate;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("quotation must be accepted before conversion (status is '{0}')")]
    QuotationNotAccepted(String),

    #[error("proforma invoice must be sent before conversion (status is '{0}')")]
    ProformaNotSent(String),

    #[error("document expired on {0}")]
    Expired(NaiveDate),

    #[error("document has no line items")]
    NoItems,
}

/// A quotation converts (to a proforma or an invoice) only while accepted,
/// still valid and non-empty.
pub fn check_quotation_convertible(
    status: &str,
    valid_until: NaiveDate,
    item_count: usize,
    today: NaiveDate,
) -> Result<(), ConversionError> {
    if status != "accepted" {
        return Err(ConversionError::QuotationNotAccepted(status.to_string()));
    }
    if valid_until < today {
        return Err(ConversionError::Expired(valid_until));
    }
    if item_count == 0 {
        return Err(ConversionError::NoItems);
    }
    Ok(())
}

/// A proforma invoice converts to an invoice only while sent, still valid and
/// non-empty.
pub fn check_proforma_convertible(
    status: &str,
    valid_until: NaiveDate,
    item_count: usize,
    today: NaiveDate,
) -> Result<(), ConversionError> {
    if status != "sent" {
        return Err(ConversionError::ProformaNotSent(status.to_string()));
    }
    if valid_until < today {
        return Err(ConversionError::Expired(valid_until));
    }
    if item_count == 0 {
        return Err(ConversionError::NoItems);
    }
    Ok(())
}

/// The generated document keeps the source's notes and gains a line naming
/// the source number; this free-text stamp is the only link back.
pub fn conversion_note(notes: Option<&str>, source_label: &str, source_number: &str) -> String {
    let stamp = format!("Converted from {} {}", source_label, source_number);
    match notes {
        Some(existing) if !existing.trim().is_empty() => format!("{}\n{}", existing, stamp),
        _ => stamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepted_valid_quotation_converts() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_quotation_convertible("accepted", date(2024, 6, 30), 3, today),
            Ok(())
        );
    }

    #[test]
    fn quotation_valid_until_today_still_converts() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_quotation_convertible("accepted", today, 1, today),
            Ok(())
        );
    }

    #[test]
    fn expired_quotation_is_rejected() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_quotation_convertible("accepted", date(2024, 5, 31), 3, today),
            Err(ConversionError::Expired(date(2024, 5, 31)))
        );
    }

    #[test]
    fn wrong_status_quotation_is_rejected() {
        let today = date(2024, 6, 1);
        for status in ["draft", "sent", "rejected", "expired", "converted"] {
            assert_eq!(
                check_quotation_convertible(status, date(2024, 6, 30), 3, today),
                Err(ConversionError::QuotationNotAccepted(status.to_string()))
            );
        }
    }

    #[test]
    fn empty_quotation_is_rejected() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_quotation_convertible("accepted", date(2024, 6, 30), 0, today),
            Err(ConversionError::NoItems)
        );
    }

    #[test]
    fn sent_valid_proforma_converts() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_proforma_convertible("sent", date(2024, 6, 15), 2, today),
            Ok(())
        );
    }

    #[test]
    fn draft_proforma_is_rejected() {
        let today = date(2024, 6, 1);
        assert_eq!(
            check_proforma_convertible("draft", date(2024, 6, 15), 2, today),
            Err(ConversionError::ProformaNotSent("draft".to_string()))
        );
    }

    #[test]
    fn note_stamps_source_number() {
        assert_eq!(
            conversion_note(None, "quotation", "QUO-2024-001"),
            "Converted from quotation QUO-2024-001"
        );
        assert_eq!(
            conversion_note(Some("Deliver to warehouse B"), "quotation", "QUO-2024-001"),
            "Deliver to warehouse B\nConverted from quotation QUO-2024-001"
        );
        assert_eq!(
            conversion_note(Some("  "), "proforma invoice", "PRO-2024-007"),
            "Converted from proforma invoice PRO-2024-007"
        );
    }
}
