use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::Database,
    error::ApiError,
    models::{Invoice, Payment, PaymentPayload, PAYMENT_METHODS},
};

#[derive(Deserialize)]
pub struct PaymentFilters {
    invoice_id: Option<Uuid>,
    customer_id: Option<Uuid>,
}

pub async fn list_payments(
    State(db): State<Database>,
    Query(filters): Query<PaymentFilters>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let mut conditions = Vec::new();
    let mut bind_count = 1;

    if filters.invoice_id.is_some() {
        conditions.push(format!("invoice_id = ${}", bind_count));
        bind_count += 1;
    }
    if filters.customer_id.is_some() {
        conditions.push(format!("customer_id = ${}", bind_count));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT * FROM payments {} ORDER BY created_at DESC",
        where_clause
    );

    let mut query = sqlx::query_as::<_, Payment>(&sql);
    if let Some(invoice_id) = filters.invoice_id {
        query = query.bind(invoice_id);
    }
    if let Some(customer_id) = filters.customer_id {
        query = query.bind(customer_id);
    }

    let payments = query.fetch_all(&db).await?;
    Ok(Json(payments))
}

pub async fn get_payment(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, ApiError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("payment {} not found", id)))?;

    Ok(Json(payment))
}

/// Payments are immutable: there is no update or delete endpoint. Recording
/// one inserts the row, moves the invoice's amount_paid/balance/status and
/// reduces the customer's open balance in a single transaction.
pub async fn create_payment(
    State(db): State<Database>,
    Json(payload): Json<PaymentPayload>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    if !PAYMENT_METHODS.contains(&payload.method.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "invalid payment method '{}'",
            payload.method
        )));
    }
    if payload.amount <= Decimal::ZERO {
        return Err(ApiError::Unprocessable(
            "payment amount must be positive".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(payload.invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {} not found", payload.invoice_id)))?;

    if invoice.status == "cancelled" {
        return Err(ApiError::Unprocessable(
            "cannot record a payment against a cancelled invoice".to_string(),
        ));
    }
    if payload.amount > invoice.balance {
        return Err(ApiError::Unprocessable(format!(
            "payment of {} exceeds open balance of {}",
            payload.amount, invoice.balance
        )));
    }

    let paid_at = payload.paid_at.unwrap_or_else(|| Utc::now().date_naive());

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (invoice_id, customer_id, amount, method, reference, paid_at, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.invoice_id)
    .bind(invoice.customer_id)
    .bind(payload.amount)
    .bind(&payload.method)
    .bind(&payload.reference)
    .bind(paid_at)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    let applied = apply_payment(invoice.total, invoice.amount_paid, payload.amount);

    sqlx::query(
        "UPDATE invoices SET amount_paid = $2, balance = $3, status = $4, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(invoice.id)
    .bind(applied.amount_paid)
    .bind(applied.balance)
    .bind(applied.status)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE customers SET current_balance = current_balance - $2, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(invoice.customer_id)
    .bind(payload.amount)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "payment of {} recorded against invoice {}",
        payment.amount,
        invoice.invoice_number
    );

    Ok((StatusCode::CREATED, Json(payment)))
}

struct AppliedPayment {
    amount_paid: Decimal,
    balance: Decimal,
    status: &'static str,
}

fn apply_payment(total: Decimal, amount_paid: Decimal, amount: Decimal) -> AppliedPayment {
    let amount_paid = amount_paid + amount;
    let balance = total - amount_paid;
    let status = if balance <= Decimal::ZERO {
        "paid"
    } else {
        "partially_paid"
    };
    AppliedPayment {
        amount_paid,
        balance,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_payment_leaves_invoice_partially_paid() {
        let applied = apply_payment(dec!(29000), dec!(0), dec!(10000));
        assert_eq!(applied.amount_paid, dec!(10000));
        assert_eq!(applied.balance, dec!(19000));
        assert_eq!(applied.status, "partially_paid");
    }

    #[test]
    fn settling_payment_marks_invoice_paid() {
        let applied = apply_payment(dec!(29000), dec!(10000), dec!(19000));
        assert_eq!(applied.amount_paid, dec!(29000));
        assert_eq!(applied.balance, dec!(0));
        assert_eq!(applied.status, "paid");
    }
}
