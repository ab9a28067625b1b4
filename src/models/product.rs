use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub wholesale_price: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub current_stock: i32,
    pub min_stock: i32,
    pub max_stock: i32,
    pub reorder_level: i32,
    pub variants: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub min_stock: Option<i32>,
    pub max_stock: Option<i32>,
    pub reorder_level: Option<i32>,
    pub variants: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: String,
    pub quantity: i32,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StockMovementPayload {
    pub movement_type: String,
    pub quantity: i32,
    pub reason: Option<String>,
    pub reference: Option<String>,
}
