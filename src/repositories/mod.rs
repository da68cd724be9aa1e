use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::models::{Conversion, Unit};

pub mod in_memory;
pub mod uom_repository;

pub use in_memory::InMemoryUomRepository;
pub use uom_repository::SeaOrmUomRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// How a record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// The record must not exist yet.
    Insert,
    /// The stored record must still carry `expected_version`.
    Update { expected_version: i32 },
}

/// Persistence boundary for units and conversion edges.
///
/// Saves return the record as stored, with its new version. A stale
/// `SaveMode::Update` fails with `ConcurrentModification`, a missing record
/// with `NotFound`.
#[async_trait]
pub trait UomRepository: Send + Sync {
    async fn load_unit(&self, code: &str) -> Result<Option<Unit>, ServiceError>;

    async fn load_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
    ) -> Result<Option<Conversion>, ServiceError>;

    async fn save_unit(&self, unit: &Unit, mode: SaveMode) -> Result<Unit, ServiceError>;

    async fn save_conversion(
        &self,
        edge: &Conversion,
        mode: SaveMode,
    ) -> Result<Conversion, ServiceError>;

    /// All units ordered by code.
    async fn list_units(&self) -> Result<Vec<Unit>, ServiceError>;

    /// All stored edges ordered by `(from_uom, to_uom)`.
    async fn list_conversions(&self) -> Result<Vec<Conversion>, ServiceError>;

    /// Inserts a new unit and its edges atomically.
    async fn insert_unit_with_conversions(
        &self,
        unit: &Unit,
        edges: &[Conversion],
    ) -> Result<(Unit, Vec<Conversion>), ServiceError>;
}
