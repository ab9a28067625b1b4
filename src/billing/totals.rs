use rust_decimal::Decimal;

/// Per-line amounts derived from quantity, unit price, discount percent and
/// tax rate. Every create, update and convert path goes through here so the
/// arithmetic (and its rounding) exists exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub net: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

/// line_total = (quantity * unit_price) * (1 - discount%/100) * (1 + tax%/100),
/// with each intermediate amount rounded to 2 decimal places.
pub fn line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    discount_percent: Decimal,
    tax_rate: Decimal,
) -> LineAmounts {
    let gross = (quantity * unit_price).round_dp(2);
    let discount_amount = (gross * discount_percent / Decimal::ONE_HUNDRED).round_dp(2);
    let net = gross - discount_amount;
    let tax_amount = (net * tax_rate / Decimal::ONE_HUNDRED).round_dp(2);
    let line_total = net + tax_amount;

    LineAmounts {
        gross,
        discount_amount,
        net,
        tax_amount,
        line_total,
    }
}

/// Header totals are sums over the line amounts; subtotal is net of discount,
/// total = subtotal + tax.
pub fn document_totals(lines: &[LineAmounts]) -> DocumentTotals {
    let mut totals = DocumentTotals {
        subtotal: Decimal::ZERO,
        discount_total: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    for line in lines {
        totals.subtotal += line.net;
        totals.discount_total += line.discount_amount;
        totals.tax_total += line.tax_amount;
    }
    totals.total = totals.subtotal + totals.tax_total;

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_with_discount_and_tax() {
        let line = line_amounts(dec!(10), dec!(150), dec!(10), dec!(16));
        assert_eq!(line.gross, dec!(1500.00));
        assert_eq!(line.discount_amount, dec!(150.00));
        assert_eq!(line.net, dec!(1350.00));
        assert_eq!(line.tax_amount, dec!(216.00));
        assert_eq!(line.line_total, dec!(1566.00));
    }

    #[test]
    fn line_total_without_discount_or_tax() {
        let line = line_amounts(dec!(3), dec!(99.99), dec!(0), dec!(0));
        assert_eq!(line.discount_amount, dec!(0.00));
        assert_eq!(line.tax_amount, dec!(0.00));
        assert_eq!(line.line_total, dec!(299.97));
    }

    #[test]
    fn fractional_quantities_round_to_cents() {
        let line = line_amounts(dec!(2.5), dec!(33.333), dec!(0), dec!(16));
        assert_eq!(line.gross, dec!(83.33));
        assert_eq!(line.tax_amount, dec!(13.33));
        assert_eq!(line.line_total, dec!(96.66));
    }

    #[test]
    fn header_totals_sum_line_amounts() {
        let lines = vec![
            line_amounts(dec!(2), dec!(500), dec!(0), dec!(16)),
            line_amounts(dec!(1), dec!(1200), dec!(25), dec!(16)),
        ];
        let totals = document_totals(&lines);

        assert_eq!(totals.subtotal, dec!(1900.00));
        assert_eq!(totals.discount_total, dec!(300.00));
        assert_eq!(totals.tax_total, dec!(304.00));
        assert_eq!(totals.total, dec!(2204.00));

        // each header figure is independently re-derivable from the lines
        let subtotal: Decimal = lines.iter().map(|l| l.net).sum();
        let tax: Decimal = lines.iter().map(|l| l.tax_amount).sum();
        assert_eq!(totals.subtotal, subtotal);
        assert_eq!(totals.tax_total, tax);
        assert_eq!(totals.total, subtotal + tax);
    }

    #[test]
    fn vat_worked_example() {
        // subtotal 25000 at 16% VAT, no discount -> total 29000
        let lines = vec![line_amounts(dec!(5), dec!(5000), dec!(0), dec!(16))];
        let totals = document_totals(&lines);

        assert_eq!(totals.subtotal, dec!(25000.00));
        assert_eq!(totals.discount_total, dec!(0.00));
        assert_eq!(totals.tax_total, dec!(4000.00));
        assert_eq!(totals.total, dec!(29000.00));
    }

    #[test]
    fn empty_document_totals_are_zero() {
        let totals = document_totals(&[]);
        assert_eq!(totals.total, Decimal::ZERO);
    }
}
