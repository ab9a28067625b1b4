use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::{database::Database, error::ApiError, models::Invoice};

#[derive(Serialize)]
pub struct DashboardSummary {
    pub customer_count: i64,
    pub product_count: i64,
    pub invoice_count: i64,
    pub open_receivables: Decimal,
    pub revenue_this_month: Decimal,
    pub overdue_invoices: i64,
    pub low_stock_products: i64,
    pub recent_invoices: Vec<Invoice>,
}

pub async fn dashboard(State(db): State<Database>) -> Result<Json<DashboardSummary>, ApiError> {
    let customer_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers WHERE is_active = TRUE")
            .fetch_one(&db)
            .await?;

    let product_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE is_active = TRUE")
            .fetch_one(&db)
            .await?;

    let invoice_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM invoices")
        .fetch_one(&db)
        .await?;

    let open_receivables = sqlx::query_scalar::<_, Option<Decimal>>(
        "SELECT SUM(balance) FROM invoices WHERE status NOT IN ('paid', 'cancelled')",
    )
    .fetch_one(&db)
    .await?
    .unwrap_or(Decimal::ZERO);

    let today = Utc::now().date_naive();
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
        .unwrap_or(today);

    let revenue_this_month = sqlx::query_scalar::<_, Option<Decimal>>(
        "SELECT SUM(amount) FROM payments WHERE paid_at >= $1",
    )
    .bind(month_start)
    .fetch_one(&db)
    .await?
    .unwrap_or(Decimal::ZERO);

    let overdue_invoices = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM invoices
         WHERE due_date < $1 AND balance > 0 AND status NOT IN ('paid', 'cancelled')",
    )
    .bind(today)
    .fetch_one(&db)
    .await?;

    let low_stock_products = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products WHERE is_active = TRUE AND current_stock <= reorder_level",
    )
    .fetch_one(&db)
    .await?;

    let recent_invoices =
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices ORDER BY created_at DESC LIMIT 5")
            .fetch_all(&db)
            .await?;

    Ok(Json(DashboardSummary {
        customer_count,
        product_count,
        invoice_count,
        open_receivables,
        revenue_this_month,
        overdue_invoices,
        low_stock_products,
        recent_invoices,
    }))
}

#[derive(Deserialize)]
pub struct SalesReportFilters {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct SalesReportRow {
    pub month: String,
    pub invoice_count: i64,
    pub invoiced: Decimal,
    pub collected: Decimal,
}

pub async fn sales_report(
    State(db): State<Database>,
    Query(filters): Query<SalesReportFilters>,
) -> Result<Json<Vec<SalesReportRow>>, ApiError> {
    let mut conditions = vec!["status <> 'cancelled'".to_string()];
    let mut bind_count = 1;

    if filters.date_from.is_some() {
        conditions.push(format!("issue_date >= ${}", bind_count));
        bind_count += 1;
    }
    if filters.date_to.is_some() {
        conditions.push(format!("issue_date <= ${}", bind_count));
    }

    let sql = format!(
        r#"
        SELECT
            to_char(issue_date, 'YYYY-MM') AS month,
            COUNT(*) AS invoice_count,
            COALESCE(SUM(total), 0) AS invoiced,
            COALESCE(SUM(amount_paid), 0) AS collected
        FROM invoices
        WHERE {}
        GROUP BY 1
        ORDER BY 1
        "#,
        conditions.join(" AND ")
    );

    let mut query = sqlx::query(&sql);
    if let Some(date_from) = filters.date_from {
        query = query.bind(date_from);
    }
    if let Some(date_to) = filters.date_to {
        query = query.bind(date_to);
    }

    let rows = query.fetch_all(&db).await?;

    let mut report = Vec::with_capacity(rows.len());
    for row in rows {
        report.push(SalesReportRow {
            month: row.try_get("month")?,
            invoice_count: row.try_get("invoice_count")?,
            invoiced: row.try_get("invoiced")?,
            collected: row.try_get("collected")?,
        });
    }

    Ok(Json(report))
}
