pub mod customers;
pub mod dashboard;
pub mod invoices;
pub mod payments;
pub mod products;
pub mod proformas;
pub mod quotations;
pub mod taxes;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
