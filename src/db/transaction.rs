/*!
 * Transaction Helper Utilities
 *
 * Runs a unit of work inside a database transaction, committing on success
 * and rolling back on error while keeping the caller's error type.
 */

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// # Example
///
/// ```rust,ignore
/// use crate::db::transaction::with_transaction;
///
/// let saved = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         uom::Entity::insert(unit_row).exec_without_returning(txn).await?;
///         uom_conversion::Entity::insert(edge_row).exec_without_returning(txn).await?;
///         Ok::<_, ServiceError>(())
///     })
/// }).await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<DbErr> + Send,
{
    db.transaction(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use sea_orm::{ConnectionTrait, Database, Statement};

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute(Statement::from_string(
            db.get_database_backend(),
            "CREATE TABLE t (v INTEGER NOT NULL)".to_string(),
        ))
        .await
        .unwrap();
        db
    }

    async fn count(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "SELECT COUNT(*) AS n FROM t".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = memory_db().await;
        let value = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO t (v) VALUES (1)".to_string(),
                ))
                .await?;
                Ok::<_, ServiceError>(42)
            })
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_keeps_error_type() {
        let db = memory_db().await;
        let result: Result<(), ServiceError> = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO t (v) VALUES (1)".to_string(),
                ))
                .await?;
                Err(ServiceError::SelfConversion { code: "kg".into() })
            })
        })
        .await;
        assert!(matches!(result, Err(ServiceError::SelfConversion { .. })));
        assert_eq!(count(&db).await, 0);
    }
}
