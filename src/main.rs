mod billing;
mod database;
mod error;
mod handlers;
mod models;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use dotenvy::dotenv;
use std::env;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::{create_database_pool, Database};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    // Initialize database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!()
        .run(&db)
        .await
        .expect("Failed to run migrations");

    log::info!("database connection successful");

    // Build the application router
    let app = create_router(db);

    // Get port from environment or use default
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    println!("🚀 Factura API starting on http://{}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn create_router(db: Database) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // Customers
        .route("/api/customers", get(handlers::customers::list_customers))
        .route("/api/customers", post(handlers::customers::create_customer))
        .route("/api/customers/:id", get(handlers::customers::get_customer))
        .route("/api/customers/:id", put(handlers::customers::update_customer))
        .route("/api/customers/:id", delete(handlers::customers::delete_customer))
        // Products and stock
        .route("/api/products", get(handlers::products::list_products))
        .route("/api/products", post(handlers::products::create_product))
        .route("/api/products/:id", get(handlers::products::get_product))
        .route("/api/products/:id", put(handlers::products::update_product))
        .route("/api/products/:id", delete(handlers::products::delete_product))
        .route("/api/products/:id/movements", get(handlers::products::list_stock_movements))
        .route("/api/products/:id/movements", post(handlers::products::create_stock_movement))
        // Quotations
        .route("/api/quotations", get(handlers::quotations::list_quotations))
        .route("/api/quotations", post(handlers::quotations::create_quotation))
        .route("/api/quotations/:id", get(handlers::quotations::get_quotation))
        .route("/api/quotations/:id", put(handlers::quotations::update_quotation))
        .route("/api/quotations/:id", delete(handlers::quotations::delete_quotation))
        .route("/api/quotations/:id/status", post(handlers::quotations::set_quotation_status))
        .route("/api/quotations/:id/convert", post(handlers::quotations::convert_quotation))
        // Proforma invoices
        .route("/api/proformas", get(handlers::proformas::list_proformas))
        .route("/api/proformas", post(handlers::proformas::create_proforma))
        .route("/api/proformas/:id", get(handlers::proformas::get_proforma))
        .route("/api/proformas/:id", put(handlers::proformas::update_proforma))
        .route("/api/proformas/:id", delete(handlers::proformas::delete_proforma))
        .route("/api/proformas/:id/status", post(handlers::proformas::set_proforma_status))
        .route("/api/proformas/:id/convert", post(handlers::proformas::convert_proforma))
        // Invoices
        .route("/api/invoices", get(handlers::invoices::list_invoices))
        .route("/api/invoices", post(handlers::invoices::create_invoice))
        .route("/api/invoices/:id", get(handlers::invoices::get_invoice))
        .route("/api/invoices/:id", put(handlers::invoices::update_invoice))
        .route("/api/invoices/:id", delete(handlers::invoices::delete_invoice))
        .route("/api/invoices/:id/status", post(handlers::invoices::set_invoice_status))
        // Payments
        .route("/api/payments", get(handlers::payments::list_payments))
        .route("/api/payments", post(handlers::payments::create_payment))
        .route("/api/payments/:id", get(handlers::payments::get_payment))
        // Tax configuration
        .route("/api/tax-rates", get(handlers::taxes::list_tax_rates))
        .route("/api/tax-rates", post(handlers::taxes::create_tax_rate))
        .route("/api/tax-rates/:id", put(handlers::taxes::update_tax_rate))
        .route("/api/tax-rates/:id", delete(handlers::taxes::delete_tax_rate))
        // Dashboard and reports
        .route("/api/dashboard", get(handlers::dashboard::dashboard))
        .route("/api/reports/sales", get(handlers::dashboard::sales_report))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024)), // 2MB
        )
        .with_state(db)
}
