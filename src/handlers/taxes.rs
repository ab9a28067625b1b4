use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    database::Database,
    error::ApiError,
    models::{TaxRate, TaxRatePayload},
};

pub async fn list_tax_rates(State(db): State<Database>) -> Result<Json<Vec<TaxRate>>, ApiError> {
    let rates = sqlx::query_as::<_, TaxRate>(
        "SELECT * FROM tax_rates WHERE is_active = TRUE ORDER BY name",
    )
    .fetch_all(&db)
    .await?;

    Ok(Json(rates))
}

pub async fn create_tax_rate(
    State(db): State<Database>,
    Json(payload): Json<TaxRatePayload>,
) -> Result<(StatusCode, Json<TaxRate>), ApiError> {
    if payload.rate < Decimal::ZERO {
        return Err(ApiError::BadRequest("rate cannot be negative".to_string()));
    }

    let is_default = payload.is_default.unwrap_or(false);

    let mut tx = db.begin().await?;

    // at most one default rate; claiming it demotes the previous holder
    if is_default {
        sqlx::query("UPDATE tax_rates SET is_default = FALSE WHERE is_default = TRUE")
            .execute(&mut *tx)
            .await?;
    }

    let rate = sqlx::query_as::<_, TaxRate>(
        "INSERT INTO tax_rates (name, rate, is_default) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(payload.rate)
    .bind(is_default)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(rate)))
}

pub async fn update_tax_rate(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TaxRatePayload>,
) -> Result<Json<TaxRate>, ApiError> {
    if payload.rate < Decimal::ZERO {
        return Err(ApiError::BadRequest("rate cannot be negative".to_string()));
    }

    let is_default = payload.is_default.unwrap_or(false);

    let mut tx = db.begin().await?;

    if is_default {
        sqlx::query("UPDATE tax_rates SET is_default = FALSE WHERE is_default = TRUE AND id <> $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let rate = sqlx::query_as::<_, TaxRate>(
        "UPDATE tax_rates SET name = $2, rate = $3, is_default = $4, updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(payload.name.trim())
    .bind(payload.rate)
    .bind(is_default)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("tax rate {} not found", id)))?;

    tx.commit().await?;
    Ok(Json(rate))
}

// Soft delete: documents keep their historical rates, so the row stays.
pub async fn delete_tax_rate(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query(
        "UPDATE tax_rates SET is_active = FALSE, is_default = FALSE, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(id)
    .execute(&db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("tax rate {} not found", id)));
    }

    Ok(StatusCode::NO_CONTENT)
}
