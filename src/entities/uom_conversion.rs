use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ServiceError;
use crate::models::Conversion;

/// Directed conversion edge row. `factor` holds the canonical decimal string.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "uom_conversions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub from_uom: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub to_uom: String,
    pub factor: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::uom::Entity",
        from = "Column::FromUom",
        to = "super::uom::Column::Code"
    )]
    FromUom,
    #[sea_orm(
        belongs_to = "super::uom::Entity",
        from = "Column::ToUom",
        to = "super::uom::Column::Code"
    )]
    ToUom,
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Conversion {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let factor = Decimal::from_str(&model.factor).map_err(|e| {
            ServiceError::db_error(DbErr::Custom(format!(
                "conversion '{}' -> '{}' has malformed factor '{}': {}",
                model.from_uom, model.to_uom, model.factor, e
            )))
        })?;

        Ok(Conversion {
            from_uom: model.from_uom,
            to_uom: model.to_uom,
            factor,
            version: model.version,
        })
    }
}
