use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    billing::{
        numbering::{allocate_number, INVOICE_SEQ},
        totals::{document_totals, line_amounts, DocumentTotals, LineAmounts},
    },
    database::Database,
    error::ApiError,
    models::{
        DocumentItem, DocumentPayload, Invoice, InvoiceDetail, ItemPayload, StatusPayload,
        INVOICE_STATUSES,
    },
};

#[derive(Deserialize)]
pub struct InvoiceFilters {
    status: Option<String>,
    customer_id: Option<Uuid>,
}

pub async fn list_invoices(
    State(db): State<Database>,
    Query(filters): Query<InvoiceFilters>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
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
        "SELECT * FROM invoices {} ORDER BY created_at DESC",
        where_clause
    );

    let mut query = sqlx::query_as::<_, Invoice>(&sql);
    if let Some(status) = &filters.status {
        query = query.bind(status);
    }
    if let Some(customer_id) = filters.customer_id {
        query = query.bind(customer_id);
    }

    let invoices = query.fetch_all(&db).await?;
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {} not found", id)))?;

    let items = sqlx::query_as::<_, DocumentItem>(
        "SELECT id, product_id, description, quantity, unit_price, discount_percent,
                tax_rate, discount_amount, tax_amount, line_total
         FROM invoice_items WHERE invoice_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&db)
    .await?;

    Ok(Json(InvoiceDetail { invoice, items }))
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
    invoice_id: Uuid,
    items: &[ItemPayload],
    lines: &[LineAmounts],
) -> Result<(), sqlx::Error> {
    for (item, line) in items.iter().zip(lines) {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                invoice_id, product_id, description, quantity, unit_price,
                discount_percent, tax_rate, discount_amount, tax_amount, line_total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invoice_id)
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

/// Header, items, number allocation and the customer balance bump all commit
/// together; any failure rolls back the lot, so no orphan header survives a
/// bad item row.
pub async fn create_invoice(
    State(db): State<Database>,
    Json(payload): Json<DocumentPayload>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let due_date = payload
        .due_date
        .ok_or_else(|| ApiError::BadRequest("due_date is required".to_string()))?;

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
    .bind(payload.customer_id)
    .bind(payload.issue_date)
    .bind(due_date)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    insert_items(&mut tx, invoice.id, &payload.items, &lines).await?;

    sqlx::query(
        "UPDATE customers SET current_balance = current_balance + $2, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(invoice.customer_id)
    .bind(invoice.total)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_invoice(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentPayload>,
) -> Result<Json<Invoice>, ApiError> {
    let due_date = payload
        .due_date
        .ok_or_else(|| ApiError::BadRequest("due_date is required".to_string()))?;

    for item in &payload.items {
        item.validate().map_err(ApiError::Unprocessable)?;
    }

    let (lines, totals) = compute_lines(&payload.items);

    let mut tx = db.begin().await?;

    let existing = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {} not found", id)))?;

    if existing.status != "draft" {
        return Err(ApiError::Unprocessable(
            "only draft invoices can be edited".to_string(),
        ));
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        UPDATE invoices SET
            customer_id = $2, issue_date = $3, due_date = $4,
            subtotal = $5, discount_total = $6, tax_total = $7, total = $8,
            balance = $8 - amount_paid, notes = $9, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.customer_id)
    .bind(payload.issue_date)
    .bind(due_date)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_items(&mut tx, id, &payload.items, &lines).await?;

    // keep receivables in step with the new total; on reassignment the old
    // customer gives the whole amount back and the new one takes it on
    if invoice.customer_id == existing.customer_id {
        sqlx::query(
            "UPDATE customers SET current_balance = current_balance + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(invoice.customer_id)
        .bind(invoice.total - existing.total)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query(
            "UPDATE customers SET current_balance = current_balance - $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(existing.customer_id)
        .bind(existing.total)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE customers SET current_balance = current_balance + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(invoice.customer_id)
        .bind(invoice.total)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut tx = db.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {} not found", id)))?;

    if invoice.status != "draft" {
        return Err(ApiError::Unprocessable(
            "only draft invoices can be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM invoices WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE customers SET current_balance = current_balance - $2, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(invoice.customer_id)
    .bind(invoice.total)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_invoice_status(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Invoice>, ApiError> {
    if !INVOICE_STATUSES.contains(&payload.status.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "invalid invoice status '{}'",
            payload.status
        )));
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&payload.status)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("invoice {} not found", id)))?;

    Ok(Json(invoice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use sqlx::PgPool;

    async fn seed_customer(pool: &PgPool, name: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO customers (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn customer_balance(pool: &PgPool, id: Uuid) -> Decimal {
        sqlx::query_scalar("SELECT current_balance FROM customers WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn widget() -> ItemPayload {
        ItemPayload {
            product_id: None,
            description: "widget".to_string(),
            quantity: dec!(1),
            unit_price: dec!(100),
            discount_percent: dec!(0),
            tax_rate: dec!(0),
        }
    }

    fn payload(customer_id: Uuid, items: Vec<ItemPayload>) -> DocumentPayload {
        let today = Utc::now().date_naive();
        DocumentPayload {
            customer_id,
            issue_date: today,
            valid_until: None,
            due_date: Some(today),
            notes: None,
            items,
        }
    }

    #[sqlx::test]
    async fn failed_item_insert_leaves_no_header(pool: PgPool) {
        let customer_id = seed_customer(&pool, "Acme Ltd").await;

        // an item referencing a product that does not exist fails after the
        // header insert, so the whole create has to roll back
        let bad_item = ItemPayload {
            product_id: Some(Uuid::new_v4()),
            ..widget()
        };
        let result = create_invoice(
            State(pool.clone()),
            Json(payload(customer_id, vec![bad_item])),
        )
        .await;
        assert!(result.is_err());

        let headers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(headers, 0);
        assert_eq!(customer_balance(&pool, customer_id).await, dec!(0));
    }

    #[sqlx::test]
    async fn reassigning_a_draft_invoice_moves_the_receivable(pool: PgPool) {
        let first = seed_customer(&pool, "Customer A").await;
        let second = seed_customer(&pool, "Customer B").await;

        let (_, Json(invoice)) =
            create_invoice(State(pool.clone()), Json(payload(first, vec![widget()])))
                .await
                .unwrap();
        assert_eq!(customer_balance(&pool, first).await, dec!(100));

        let pricier = ItemPayload {
            unit_price: dec!(120),
            ..widget()
        };
        let Json(updated) = update_invoice(
            State(pool.clone()),
            Path(invoice.id),
            Json(payload(second, vec![pricier])),
        )
        .await
        .unwrap();

        assert_eq!(updated.total, dec!(120));
        assert_eq!(customer_balance(&pool, first).await, dec!(0));
        assert_eq!(customer_balance(&pool, second).await, dec!(120));
    }

    #[sqlx::test]
    async fn editing_a_draft_invoice_adjusts_the_same_customer(pool: PgPool) {
        let customer_id = seed_customer(&pool, "Acme Ltd").await;

        let (_, Json(invoice)) = create_invoice(
            State(pool.clone()),
            Json(payload(customer_id, vec![widget()])),
        )
        .await
        .unwrap();

        let cheaper = ItemPayload {
            unit_price: dec!(80),
            ..widget()
        };
        update_invoice(
            State(pool.clone()),
            Path(invoice.id),
            Json(payload(customer_id, vec![cheaper])),
        )
        .await
        .unwrap();

        assert_eq!(customer_balance(&pool, customer_id).await, dec!(80));
    }
}
