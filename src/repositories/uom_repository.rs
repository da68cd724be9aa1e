use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use std::sync::Arc;
use tracing::debug;

use crate::db::transaction::with_transaction;
use crate::entities::{uom, uom_conversion};
use crate::errors::{RecordKey, ServiceError};
use crate::models::{Conversion, Unit};
use crate::repositories::{BaseRepository, Repository, SaveMode, UomRepository};

/// SeaORM-backed repository for units and conversion edges
#[derive(Debug, Clone)]
pub struct SeaOrmUomRepository {
    base: BaseRepository,
}

impl SeaOrmUomRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmUomRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Locks both endpoint rows for the rest of the transaction and checks they
/// exist and share a category. A concurrent category change either waits for
/// this transaction or is seen here.
async fn lock_endpoints<C: ConnectionTrait>(db: &C, edge: &Conversion) -> Result<(), ServiceError> {
    let units = uom::Entity::find()
        .filter(uom::Column::Code.is_in([edge.from_uom.as_str(), edge.to_uom.as_str()]))
        .lock_exclusive()
        .all(db)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(Unit::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let resolve = |code: &str| {
        units
            .iter()
            .find(|unit| unit.code == code)
            .ok_or_else(|| ServiceError::UnknownUnit {
                code: code.to_string(),
            })
    };
    resolve(edge.from_uom.as_str())?.ensure_same_category(resolve(edge.to_uom.as_str())?)
}

/// Fails if any unit sharing an edge with `unit` is in another category.
async fn check_neighbours<C: ConnectionTrait>(db: &C, unit: &Unit) -> Result<(), ServiceError> {
    let others: Vec<String> = uom_conversion::Entity::find()
        .filter(
            Condition::any()
                .add(uom_conversion::Column::FromUom.eq(unit.code.as_str()))
                .add(uom_conversion::Column::ToUom.eq(unit.code.as_str())),
        )
        .all(db)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|edge| {
            if edge.from_uom == unit.code {
                edge.to_uom
            } else {
                edge.from_uom
            }
        })
        .collect();
    if others.is_empty() {
        return Ok(());
    }

    let neighbours = uom::Entity::find()
        .filter(uom::Column::Code.is_in(others))
        .order_by_asc(uom::Column::Code)
        .all(db)
        .await
        .map_err(ServiceError::db_error)?;
    for neighbour in neighbours {
        unit.ensure_same_category(&Unit::try_from(neighbour)?)?;
    }
    Ok(())
}

async fn insert_unit<C: ConnectionTrait>(db: &C, unit: &Unit) -> Result<Unit, ServiceError> {
    let row = uom::ActiveModel {
        code: Set(unit.code.clone()),
        name: Set(unit.name.clone()),
        system: Set(unit.system.to_string()),
        category: Set(unit.category.to_string()),
        is_packaging: Set(unit.is_packaging),
        is_active: Set(unit.is_active),
        version: Set(1),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    };

    uom::Entity::insert(row)
        .exec_without_returning(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::DuplicateCode {
                    code: unit.code.clone(),
                }
            } else {
                ServiceError::db_error(e)
            }
        })?;

    Ok(Unit {
        version: 1,
        ..unit.clone()
    })
}

async fn update_unit<C: ConnectionTrait>(
    db: &C,
    unit: &Unit,
    expected_version: i32,
) -> Result<Unit, ServiceError> {
    let next_version = expected_version + 1;
    let result = uom::Entity::update_many()
        .col_expr(uom::Column::Name, Expr::value(unit.name.clone()))
        .col_expr(uom::Column::System, Expr::value(unit.system.to_string()))
        .col_expr(uom::Column::Category, Expr::value(unit.category.to_string()))
        .col_expr(uom::Column::IsPackaging, Expr::value(unit.is_packaging))
        .col_expr(uom::Column::IsActive, Expr::value(unit.is_active))
        .col_expr(uom::Column::Version, Expr::value(next_version))
        .col_expr(uom::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(uom::Column::Code.eq(unit.code.as_str()))
        .filter(uom::Column::Version.eq(expected_version))
        .exec(db)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let exists = uom::Entity::find_by_id(unit.code.clone())
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();
        return Err(if exists {
            ServiceError::ConcurrentModification(RecordKey::unit(&unit.code))
        } else {
            ServiceError::not_found_unit(&unit.code)
        });
    }

    Ok(Unit {
        version: next_version,
        ..unit.clone()
    })
}

async fn insert_conversion<C: ConnectionTrait>(
    db: &C,
    edge: &Conversion,
) -> Result<Conversion, ServiceError> {
    let row = uom_conversion::ActiveModel {
        from_uom: Set(edge.from_uom.clone()),
        to_uom: Set(edge.to_uom.clone()),
        factor: Set(edge.factor.normalize().to_string()),
        version: Set(1),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    };

    uom_conversion::Entity::insert(row)
        .exec_without_returning(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::ConcurrentModification(RecordKey::conversion(
                    &edge.from_uom,
                    &edge.to_uom,
                ))
            } else {
                ServiceError::db_error(e)
            }
        })?;

    Ok(Conversion {
        version: 1,
        ..edge.clone()
    })
}

async fn update_conversion<C: ConnectionTrait>(
    db: &C,
    edge: &Conversion,
    expected_version: i32,
) -> Result<Conversion, ServiceError> {
    let next_version = expected_version + 1;
    let result = uom_conversion::Entity::update_many()
        .col_expr(
            uom_conversion::Column::Factor,
            Expr::value(edge.factor.normalize().to_string()),
        )
        .col_expr(uom_conversion::Column::Version, Expr::value(next_version))
        .col_expr(uom_conversion::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(uom_conversion::Column::FromUom.eq(edge.from_uom.as_str()))
        .filter(uom_conversion::Column::ToUom.eq(edge.to_uom.as_str()))
        .filter(uom_conversion::Column::Version.eq(expected_version))
        .exec(db)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let exists = uom_conversion::Entity::find_by_id((edge.from_uom.clone(), edge.to_uom.clone()))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();
        let key = RecordKey::conversion(&edge.from_uom, &edge.to_uom);
        return Err(if exists {
            ServiceError::ConcurrentModification(key)
        } else {
            ServiceError::NotFound(key)
        });
    }

    Ok(Conversion {
        version: next_version,
        ..edge.clone()
    })
}

#[async_trait]
impl UomRepository for SeaOrmUomRepository {
    async fn load_unit(&self, code: &str) -> Result<Option<Unit>, ServiceError> {
        uom::Entity::find_by_id(code.to_string())
            .one(self.get_db())
            .await
            .map_err(ServiceError::db_error)?
            .map(Unit::try_from)
            .transpose()
    }

    async fn load_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
    ) -> Result<Option<Conversion>, ServiceError> {
        uom_conversion::Entity::find_by_id((from_uom.to_string(), to_uom.to_string()))
            .one(self.get_db())
            .await
            .map_err(ServiceError::db_error)?
            .map(Conversion::try_from)
            .transpose()
    }

    async fn save_unit(&self, unit: &Unit, mode: SaveMode) -> Result<Unit, ServiceError> {
        debug!(code = %unit.code, ?mode, "Saving unit");
        let expected_version = match mode {
            SaveMode::Insert => return insert_unit(self.get_db(), unit).await,
            SaveMode::Update { expected_version } => expected_version,
        };

        // The row update takes the lock before edges are inspected, so an
        // edge committed meanwhile is visible to the check.
        let unit = unit.clone();
        with_transaction(self.get_db(), move |txn| {
            Box::pin(async move {
                let saved = update_unit(txn, &unit, expected_version).await?;
                check_neighbours(txn, &saved).await?;
                Ok(saved)
            })
        })
        .await
    }

    async fn save_conversion(
        &self,
        edge: &Conversion,
        mode: SaveMode,
    ) -> Result<Conversion, ServiceError> {
        debug!(from_uom = %edge.from_uom, to_uom = %edge.to_uom, ?mode, "Saving conversion");
        let edge = edge.clone();
        with_transaction(self.get_db(), move |txn| {
            Box::pin(async move {
                lock_endpoints(txn, &edge).await?;
                match mode {
                    SaveMode::Insert => insert_conversion(txn, &edge).await,
                    SaveMode::Update { expected_version } => {
                        update_conversion(txn, &edge, expected_version).await
                    }
                }
            })
        })
        .await
    }

    async fn list_units(&self) -> Result<Vec<Unit>, ServiceError> {
        uom::Entity::find()
            .order_by_asc(uom::Column::Code)
            .all(self.get_db())
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(Unit::try_from)
            .collect()
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>, ServiceError> {
        uom_conversion::Entity::find()
            .order_by_asc(uom_conversion::Column::FromUom)
            .order_by_asc(uom_conversion::Column::ToUom)
            .all(self.get_db())
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(Conversion::try_from)
            .collect()
    }

    async fn insert_unit_with_conversions(
        &self,
        unit: &Unit,
        edges: &[Conversion],
    ) -> Result<(Unit, Vec<Conversion>), ServiceError> {
        let unit = unit.clone();
        let edges = edges.to_vec();

        with_transaction(self.get_db(), move |txn| {
            Box::pin(async move {
                let saved_unit = insert_unit(txn, &unit).await?;
                let mut saved_edges = Vec::with_capacity(edges.len());
                for edge in &edges {
                    lock_endpoints(txn, edge).await?;
                    saved_edges.push(insert_conversion(txn, edge).await?);
                }
                Ok((saved_unit, saved_edges))
            })
        })
        .await
    }
}
