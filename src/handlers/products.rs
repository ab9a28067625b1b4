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
    models::{Product, ProductPayload, StockMovement, StockMovementPayload},
};

#[derive(Deserialize)]
pub struct ProductFilters {
    q: Option<String>,
    category: Option<String>,
    low_stock: Option<bool>,
}

pub async fn list_products(
    State(db): State<Database>,
    Query(filters): Query<ProductFilters>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let mut conditions = Vec::new();
    let mut bind_count = 1;

    if filters.q.is_some() {
        conditions.push(format!(
            "(name ILIKE ${n} OR sku ILIKE ${n})",
            n = bind_count
        ));
        bind_count += 1;
    }
    if filters.category.is_some() {
        conditions.push(format!("category = ${}", bind_count));
    }
    if filters.low_stock == Some(true) {
        conditions.push("current_stock <= reorder_level".to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!("SELECT * FROM products {} ORDER BY name", where_clause);

    let mut query = sqlx::query_as::<_, Product>(&sql);
    if let Some(q) = &filters.q {
        query = query.bind(format!("%{}%", q.trim()));
    }
    if let Some(category) = &filters.category {
        query = query.bind(category);
    }

    let products = query.fetch_all(&db).await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {} not found", id)))?;

    Ok(Json(product))
}

pub async fn create_product(
    State(db): State<Database>,
    Json(payload): Json<ProductPayload>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    if payload.sku.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("sku and name are required".to_string()));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (
            sku, name, description, category, unit,
            purchase_price, selling_price, wholesale_price, retail_price,
            min_stock, max_stock, reorder_level, variants, is_active
        )
        VALUES (
            $1, $2, $3, $4, COALESCE($5, 'pcs'),
            COALESCE($6, 0), COALESCE($7, 0), $8, $9,
            COALESCE($10, 0), COALESCE($11, 0), COALESCE($12, 0), $13, COALESCE($14, TRUE)
        )
        RETURNING *
        "#,
    )
    .bind(payload.sku.trim())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.unit)
    .bind(payload.purchase_price)
    .bind(payload.selling_price)
    .bind(payload.wholesale_price)
    .bind(payload.retail_price)
    .bind(payload.min_stock)
    .bind(payload.max_stock)
    .bind(payload.reorder_level)
    .bind(&payload.variants)
    .bind(payload.is_active)
    .fetch_one(&db)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::Unprocessable(format!("sku '{}' already exists", payload.sku.trim()))
        }
        _ => ApiError::Database(err),
    })?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductPayload>,
) -> Result<Json<Product>, ApiError> {
    if payload.sku.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("sku and name are required".to_string()));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            sku = $2, name = $3, description = $4, category = $5,
            unit = COALESCE($6, unit),
            purchase_price = COALESCE($7, purchase_price),
            selling_price = COALESCE($8, selling_price),
            wholesale_price = $9, retail_price = $10,
            min_stock = COALESCE($11, min_stock),
            max_stock = COALESCE($12, max_stock),
            reorder_level = COALESCE($13, reorder_level),
            variants = COALESCE($14, variants),
            is_active = COALESCE($15, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.sku.trim())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.unit)
    .bind(payload.purchase_price)
    .bind(payload.selling_price)
    .bind(payload.wholesale_price)
    .bind(payload.retail_price)
    .bind(payload.min_stock)
    .bind(payload.max_stock)
    .bind(payload.reorder_level)
    .bind(&payload.variants)
    .bind(payload.is_active)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("product {} not found", id)))?;

    Ok(Json(product))
}

pub async fn delete_product(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let referenced = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT (SELECT COUNT(*) FROM invoice_items WHERE product_id = $1)
             + (SELECT COUNT(*) FROM quotation_items WHERE product_id = $1)
             + (SELECT COUNT(*) FROM proforma_items WHERE product_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&db)
    .await?;

    if referenced > 0 {
        return Err(ApiError::Unprocessable(
            "product appears on documents and cannot be deleted; deactivate instead".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM stock_movements WHERE product_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("product {} not found", id)));
    }

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

// Stock movements

pub async fn list_stock_movements(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let movements = sqlx::query_as::<_, StockMovement>(
        "SELECT * FROM stock_movements WHERE product_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&db)
    .await?;

    Ok(Json(movements))
}

/// Stock only changes through a movement row; the movement snapshots the
/// previous and resulting stock and the product row is updated in the same
/// transaction.
pub async fn create_stock_movement(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockMovementPayload>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    let mut tx = db.begin().await?;

    let current_stock = sqlx::query_scalar::<_, i32>(
        "SELECT current_stock FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("product {} not found", id)))?;

    let new_stock = next_stock(current_stock, &payload.movement_type, payload.quantity)?;

    let movement = sqlx::query_as::<_, StockMovement>(
        r#"
        INSERT INTO stock_movements (
            product_id, movement_type, quantity, previous_stock, new_stock, reason, reference
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.movement_type)
    .bind(payload.quantity)
    .bind(current_stock)
    .bind(new_stock)
    .bind(&payload.reason)
    .bind(&payload.reference)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE products SET current_stock = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(new_stock)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

fn next_stock(current_stock: i32, movement_type: &str, quantity: i32) -> Result<i32, ApiError> {
    match movement_type {
        "in" => {
            if quantity <= 0 {
                return Err(ApiError::Unprocessable(
                    "'in' movements require a positive quantity".to_string(),
                ));
            }
            current_stock
                .checked_add(quantity)
                .ok_or_else(|| ApiError::Unprocessable("movement overflows stock".to_string()))
        }
        "out" => {
            if quantity <= 0 {
                return Err(ApiError::Unprocessable(
                    "'out' movements require a positive quantity".to_string(),
                ));
            }
            if quantity > current_stock {
                return Err(ApiError::Unprocessable(format!(
                    "cannot move {} out with only {} in stock",
                    quantity, current_stock
                )));
            }
            Ok(current_stock - quantity)
        }
        // signed correction, e.g. after a stock take
        "adjustment" => {
            let adjusted = current_stock
                .checked_add(quantity)
                .ok_or_else(|| ApiError::Unprocessable("movement overflows stock".to_string()))?;
            if adjusted < 0 {
                return Err(ApiError::Unprocessable(
                    "adjustment would make stock negative".to_string(),
                ));
            }
            Ok(adjusted)
        }
        other => Err(ApiError::BadRequest(format!(
            "unknown movement type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_and_out_move_stock() {
        assert_eq!(next_stock(10, "in", 5).unwrap(), 15);
        assert_eq!(next_stock(10, "out", 4).unwrap(), 6);
    }

    #[test]
    fn out_cannot_exceed_current_stock() {
        assert!(matches!(
            next_stock(3, "out", 5),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn adjustment_is_a_signed_delta() {
        assert_eq!(next_stock(10, "adjustment", -4).unwrap(), 6);
        assert!(matches!(
            next_stock(10, "adjustment", -11),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(matches!(
            next_stock(10, "in", 0),
            Err(ApiError::Unprocessable(_))
        ));
        assert!(matches!(
            next_stock(10, "out", -2),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn overflowing_movements_are_rejected() {
        assert!(matches!(
            next_stock(i32::MAX, "in", 1),
            Err(ApiError::Unprocessable(_))
        ));
        assert!(matches!(
            next_stock(i32::MAX, "adjustment", 1),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn unknown_movement_type_is_rejected() {
        assert!(matches!(
            next_stock(10, "sideways", 1),
            Err(ApiError::BadRequest(_))
        ));
    }
}
