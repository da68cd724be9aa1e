use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::Unit;

/// Unit of measure row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "uoms")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub name: String,
    /// Provenance standard, stored as its snake_case tag
    pub system: String,
    /// Measurement dimension, stored as its snake_case tag
    pub category: String,
    pub is_packaging: bool,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Unit {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let system = model.system.parse().map_err(|_| {
            ServiceError::db_error(DbErr::Custom(format!(
                "unit '{}' has unrecognized system '{}'",
                model.code, model.system
            )))
        })?;
        let category = model.category.parse().map_err(|_| {
            ServiceError::db_error(DbErr::Custom(format!(
                "unit '{}' has unrecognized category '{}'",
                model.code, model.category
            )))
        })?;

        Ok(Unit {
            code: model.code,
            name: model.name,
            system,
            category,
            is_packaging: model.is_packaging,
            is_active: model.is_active,
            version: model.version,
        })
    }
}
