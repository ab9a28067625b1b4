use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    billing::{
        convert::{check_proforma_convertible, conversion_note},
        numbering::{allocate_number, INVOICE_SEQ, PROFORMA_SEQ},
        totals::{document_totals, line_amounts, DocumentTotals, LineAmounts},
    },
    database::Database,
    error::ApiError,
    models::{
        ConvertPayload, DocumentItem, DocumentPayload, Invoice, ItemPayload, ProformaDetail,
        ProformaInvoice, StatusPayload, PROFORMA_STATUSES,
    },
};

#[derive(Deserialize)]
pub struct ProformaFilters {
    status: Option<String>,
    customer_id: Option<Uuid>,
}

pub async fn list_proformas(
    State(db): State<Database>,
    Query(filters): Query<ProformaFilters>,
) -> Result<Json<Vec<ProformaInvoice>>, ApiError> {
    let mut conditions = Vec::new();
    let mut bind_count = 1;

    if filters.status.is_some() {
        conditions.push(format!("status = ${}", bind_count));
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
        "SELECT * FROM proforma_invoices {} ORDER BY created_at DESC",
        where_clause
    );

    let mut query = sqlx::query_as::<_, ProformaInvoice>(&sql);
    if let Some(status) = &filters.status {
        query = query.bind(status);
    }
    if let Some(customer_id) = filters.customer_id {
        query = query.bind(customer_id);
    }

    let proformas = query.fetch_all(&db).await?;
    Ok(Json(proformas))
}

pub async fn get_proforma(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProformaDetail>, ApiError> {
    let proforma =
        sqlx::query_as::<_, ProformaInvoice>("SELECT * FROM proforma_invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("proforma invoice {} not found", id)))?;

    let items = sqlx::query_as::<_, DocumentItem>(
        "SELECT id, product_id, description, quantity, unit_price, discount_percent,
                tax_rate, discount_amount, tax_amount, line_total
         FROM proforma_items WHERE proforma_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&db)
    .await?;

    Ok(Json(ProformaDetail { proforma, items }))
}

fn compute_lines(items: &[ItemPayload]) -> (Vec<LineAmounts>, DocumentTotals) {
    let lines: Vec<LineAmounts> = items
        .iter()
        .map(|i| line_amounts(i.quantity, i.unit_price, i.discount_percent, i.tax_rate))
        .collect();
    let totals = document_totals(&lines);
    (lines, totals)
}

async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    proforma_id: Uuid,
    items: &[ItemPayload],
    lines: &[LineAmounts],
) -> Result<(), sqlx::Error> {
    for (item, line) in items.iter().zip(lines) {
        sqlx::query(
            r#"
            INSERT INTO proforma_items (
                proforma_id, product_id, description, quantity, unit_price,
                discount_percent, tax_rate, discount_amount, tax_amount, line_total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(proforma_id)
        .bind(item.product_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_percent)
        .bind(item.tax_rate)
        .bind(line.discount_amount)
        .bind(line.tax_amount)
        .bind(line.line_total)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_proforma(
    State(db): State<Database>,
    Json(payload): Json<DocumentPayload>,
) -> Result<(StatusCode, Json<ProformaInvoice>), ApiError> {
    let valid_until = payload
        .valid_until
        .ok_or_else(|| ApiError::BadRequest("valid_until is required".to_string()))?;

    for item in &payload.items {
        item.validate().map_err(ApiError::Unprocessable)?;
    }

    let (lines, totals) = compute_lines(&payload.items);

    let mut tx = db.begin().await?;

    let customer_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1)")
            .bind(payload.customer_id)
            .fetch_one(&mut *tx)
            .await?;
    if !customer_exists {
        return Err(ApiError::Unprocessable(format!(
            "unknown customer {}",
            payload.customer_id
        )));
    }

    let number = allocate_number(&mut tx, PROFORMA_SEQ.0, PROFORMA_SEQ.1).await?;

    let proforma = sqlx::query_as::<_, ProformaInvoice>(
        r#"
        INSERT INTO proforma_invoices (
            proforma_number, customer_id, issue_date, valid_until,
            subtotal, discount_total, tax_total, total, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&number)
    .bind(payload.customer_id)
    .bind(payload.issue_date)
    .bind(valid_until)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    insert_items(&mut tx, proforma.id, &payload.items, &lines).await?;

    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(proforma)))
}

pub async fn update_proforma(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentPayload>,
) -> Result<Json<ProformaInvoice>, ApiError> {
    let valid_until = payload
        .valid_until
        .ok_or_else(|| ApiError::BadRequest("valid_until is required".to_string()))?;

    for item in &payload.items {
        item.validate().map_err(ApiError::Unprocessable)?;
    }

    let (lines, totals) = compute_lines(&payload.items);

    let mut tx = db.begin().await?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM proforma_invoices WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("proforma invoice {} not found", id)))?;

    if status == "converted" {
        return Err(ApiError::Unprocessable(
            "converted proforma invoices cannot be edited".to_string(),
        ));
    }

    let proforma = sqlx::query_as::<_, ProformaInvoice>(
        r#"
        UPDATE proforma_invoices SET
            customer_id = $2, issue_date = $3, valid_until = $4,
            subtotal = $5, discount_total = $6, tax_total = $7, total = $8,
            notes = $9, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.customer_id)
    .bind(payload.issue_date)
    .bind(valid_until)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM proforma_items WHERE proforma_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_items(&mut tx, id, &payload.items, &lines).await?;

    tx.commit().await?;
    Ok(Json(proforma))
}

pub async fn delete_proforma(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let status =
        sqlx::query_scalar::<_, String>("SELECT status FROM proforma_invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("proforma invoice {} not found", id)))?;

    if status != "draft" {
        return Err(ApiError::Unprocessable(
            "only draft proforma invoices can be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM proforma_invoices WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_proforma_status(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<ProformaInvoice>, ApiError> {
    if !PROFORMA_STATUSES.contains(&payload.status.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "invalid proforma status '{}'",
            payload.status
        )));
    }

    let proforma = sqlx::query_as::<_, ProformaInvoice>(
        "UPDATE proforma_invoices SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&payload.status)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("proforma invoice {} not found", id)))?;

    Ok(Json(proforma))
}

/// Convert a sent proforma invoice into an invoice: copy the items, recompute
/// totals, allocate an invoice number, stamp the note, mark the proforma
/// converted and bump the customer balance, all in one transaction.
pub async fn convert_proforma(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConvertPayload>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let mut tx = db.begin().await?;

    let proforma = sqlx::query_as::<_, ProformaInvoice>(
        "SELECT * FROM proforma_invoices WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("proforma invoice {} not found", id)))?;

    let items = sqlx::query_as::<_, DocumentItem>(
        "SELECT id, product_id, description, quantity, unit_price, discount_percent,
                tax_rate, discount_amount, tax_amount, line_total
         FROM proforma_items WHERE proforma_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    let today = Utc::now().date_naive();
    check_proforma_convertible(&proforma.status, proforma.valid_until, items.len(), today)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;

    let lines: Vec<LineAmounts> = items
        .iter()
        .map(|i| line_amounts(i.quantity, i.unit_price, i.discount_percent, i.tax_rate))
        .collect();
    let totals = document_totals(&lines);
    let notes = conversion_note(
        proforma.notes.as_deref(),
        "proforma invoice",
        &proforma.proforma_number,
    );

    let due_date = payload.due_date.unwrap_or(proforma.valid_until);
    let number = allocate_number(&mut tx, INVOICE_SEQ.0, INVOICE_SEQ.1).await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (
            invoice_number, customer_id, issue_date, due_date,
            subtotal, discount_total, tax_total, total, amount_paid, balance, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&number)
    .bind(proforma.customer_id)
    .bind(today)
    .bind(due_date)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .bind(&notes)
    .fetch_one(&mut *tx)
    .await?;

    for (item, line) in items.iter().zip(&lines) {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                invoice_id, product_id, description, quantity, unit_price,
                discount_percent, tax_rate, discount_amount, tax_amount, line_total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invoice.id)
        .bind(item.product_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_percent)
        .bind(item.tax_rate)
        .bind(line.discount_amount)
        .bind(line.tax_amount)
        .bind(line.line_total)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE customers SET current_balance = current_balance + $2, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(invoice.customer_id)
    .bind(invoice.total)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE proforma_invoices SET status = 'converted', updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "proforma invoice {} converted to invoice {}",
        proforma.proforma_number,
        invoice.invoice_number
    );

    Ok((StatusCode::CREATED, Json(invoice)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn creating_for_unknown_customer_is_rejected(pool: PgPool) {
        let today = Utc::now().date_naive();
        let payload = DocumentPayload {
            customer_id: Uuid::new_v4(),
            issue_date: today,
            valid_until: Some(today),
            due_date: None,
            notes: None,
            items: vec![ItemPayload {
                product_id: None,
                description: "widget".to_string(),
                quantity: dec!(1),
                unit_price: dec!(100),
                discount_percent: dec!(0),
                tax_rate: dec!(0),
            }],
        };

        let result = create_proforma(State(pool.clone()), Json(payload)).await;
        assert!(matches!(result, Err(ApiError::Unprocessable(_))));

        let headers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proforma_invoices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(headers, 0);
    }
}
