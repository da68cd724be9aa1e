use std::sync::Arc;
use std::time::Duration;

use stateset_uom::{
    db::{self, DbConfig, DbPool},
    dto::uom::{CreateUnitRequest, InitialConversionRequest},
    repositories::{InMemoryUomRepository, SeaOrmUomRepository, UomRepository},
    UomService,
};

/// Which repository a test service runs against.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Backend {
    InMemory,
    Sqlite,
}

/// Fresh in-memory SQLite database with the schema applied.
///
/// A single pooled connection keeps the in-memory database alive for the
/// lifetime of the pool.
pub async fn sqlite_pool() -> DbPool {
    let pool = db::establish_connection_with_config(&DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

#[allow(dead_code)]
pub async fn repository(backend: Backend) -> Arc<dyn UomRepository> {
    match backend {
        Backend::InMemory => Arc::new(InMemoryUomRepository::new()),
        Backend::Sqlite => Arc::new(SeaOrmUomRepository::new(Arc::new(sqlite_pool().await))),
    }
}

#[allow(dead_code)]
pub async fn service(backend: Backend) -> UomService {
    UomService::new(
        repository(backend).await,
        Duration::from_secs(5),
        Duration::from_secs(60),
    )
}

#[allow(dead_code)]
pub fn unit_request(code: &str, category: &str) -> CreateUnitRequest {
    CreateUnitRequest {
        code: code.to_string(),
        name: format!("Unit {}", code),
        system: "si".to_string(),
        category: category.to_string(),
        is_packaging: false,
        conversions: Vec::new(),
    }
}

#[allow(dead_code)]
pub fn with_conversion(mut request: CreateUnitRequest, to_uom: &str, factor: &str) -> CreateUnitRequest {
    request.conversions.push(InitialConversionRequest {
        to_uom: to_uom.to_string(),
        factor: factor.to_string(),
    });
    request
}
