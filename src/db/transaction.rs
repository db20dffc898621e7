/*!
 * Unit-of-work helper.
 *
 * Runs a closure inside one database transaction. The transaction commits
 * when the closure returns `Ok` and rolls back when it returns `Err`. The
 * closure's own error type is handed back untouched, so a `ServiceError`
 * such as `InsufficientStock` raised mid-transaction reaches the caller as
 * itself rather than as a stringified `DbErr`.
 */

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};
use uuid::Uuid;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let order = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         let order = order_model.insert(txn).await?;
///         CatalogService::decrement_stock(txn, perfume_id, 2).await?;
///         Ok(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>>,
    E: From<DbErr>,
{
    let transaction_id = Uuid::new_v4();
    let start = std::time::Instant::now();
    debug!(transaction_id = %transaction_id, "Starting database transaction");

    let txn = db.begin().await?;
    let outcome = f(&txn).await;
    let elapsed = start.elapsed();
    histogram!("perfume_db.transaction.duration_seconds", elapsed.as_secs_f64());

    match outcome {
        Ok(value) => {
            txn.commit().await?;
            counter!("perfume_db.transaction.committed", 1);
            debug!(transaction_id = %transaction_id, "Transaction committed in {:?}", elapsed);
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(
                    transaction_id = %transaction_id,
                    error = %rollback_err,
                    "Explicit rollback failed; connection drop will discard the transaction"
                );
            }
            counter!("perfume_db.transaction.rolled_back", 1);
            debug!(transaction_id = %transaction_id, "Transaction rolled back after {:?}", elapsed);
            Err(err)
        }
    }
}
