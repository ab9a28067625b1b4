use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::Database,
    error::ApiError,
    models::{Customer, CustomerPayload},
};

#[derive(Deserialize)]
pub struct CustomerFilters {
    q: Option<String>,
    active: Option<bool>,
}

pub async fn list_customers(
    State(db): State<Database>,
    Query(filters): Query<CustomerFilters>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    let mut conditions = Vec::new();
    let mut bind_count = 1;

    if filters.q.is_some() {
        conditions.push(format!(
            "(name ILIKE ${n} OR email ILIKE ${n} OR phone ILIKE ${n})",
            n = bind_count
        ));
        bind_count += 1;
    }
    if filters.active.is_some() {
        conditions.push(format!("is_active = ${}", bind_count));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!("SELECT * FROM customers {} ORDER BY name", where_clause);

    let mut query = sqlx::query_as::<_, Customer>(&sql);
    if let Some(q) = &filters.q {
        query = query.bind(format!("%{}%", q.trim()));
    }
    if let Some(active) = filters.active {
        query = query.bind(active);
    }

    let customers = query.fetch_all(&db).await?;
    Ok(Json(customers))
}

pub async fn get_customer(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, ApiError> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("customer {} not found", id)))?;

    Ok(Json(customer))
}

pub async fn create_customer(
    State(db): State<Database>,
    Json(payload): Json<CustomerPayload>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("customer name is required".to_string()));
    }

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (
            name, email, phone, address_line1, address_line2,
            city, country, tax_pin, credit_limit, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 0), COALESCE($10, TRUE))
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address_line1)
    .bind(&payload.address_line2)
    .bind(&payload.city)
    .bind(&payload.country)
    .bind(&payload.tax_pin)
    .bind(payload.credit_limit)
    .bind(payload.is_active)
    .fetch_one(&db)
    .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn update_customer(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomerPayload>,
) -> Result<Json<Customer>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("customer name is required".to_string()));
    }

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        UPDATE customers SET
            name = $2, email = $3, phone = $4, address_line1 = $5, address_line2 = $6,
            city = $7, country = $8, tax_pin = $9,
            credit_limit = COALESCE($10, credit_limit),
            is_active = COALESCE($11, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address_line1)
    .bind(&payload.address_line2)
    .bind(&payload.city)
    .bind(&payload.country)
    .bind(&payload.tax_pin)
    .bind(payload.credit_limit)
    .bind(payload.is_active)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("customer {} not found", id)))?;

    Ok(Json(customer))
}

pub async fn delete_customer(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let document_count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT (SELECT COUNT(*) FROM invoices WHERE customer_id = $1)
             + (SELECT COUNT(*) FROM quotations WHERE customer_id = $1)
             + (SELECT COUNT(*) FROM proforma_invoices WHERE customer_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&db)
    .await?;

    if document_count > 0 {
        return Err(ApiError::Unprocessable(
            "customer has documents and cannot be deleted; deactivate instead".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM customers WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("customer {} not found", id)));
    }

    Ok(StatusCode::NO_CONTENT)
}
