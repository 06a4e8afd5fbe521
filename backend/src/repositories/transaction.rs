//! Transaction management utilities for repositories.

use sqlx::postgres::PgTransaction;
use sqlx::PgPool;

use super::session::StoreError;

/// Begin a new database transaction.
///
/// Returns a transaction handle that can be used for multiple database operations.
/// On success, the transaction can be committed via [`commit_transaction`].
/// On failure, the transaction can be rolled back via [`rollback_transaction`];
/// dropping the handle without committing also rolls back.
pub async fn begin_transaction(db: &PgPool) -> Result<PgTransaction<'static>, StoreError> {
    db.begin().await.map_err(StoreError::from)
}

/// Commit a transaction.
pub async fn commit_transaction(tx: PgTransaction<'_>) -> Result<(), StoreError> {
    tx.commit().await.map_err(StoreError::from)
}

/// Rollback a transaction.
pub async fn rollback_transaction(tx: PgTransaction<'_>) -> Result<(), StoreError> {
    tx.rollback().await.map_err(StoreError::from)
}
