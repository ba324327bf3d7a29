//! SQLite inventory store
//!
//! `pool.begin()` hands out an sqlx transaction that rolls back when
//! dropped, which gives the all-or-nothing guarantee for free.

use super::{InventoryStore, QTY_EPSILON, StoreError, StoreResult, StoreTransaction};
use shared::models::{DerivedUnit, SourceBatch};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed inventory store
#[derive(Clone)]
pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

impl SqliteInventoryStore {
    /// Open (creating if missing) and migrate the database at `url`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(format!("Invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(url, "Inventory database connected");

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply migrations
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("Inventory migrations applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a box with a fresh incoming document
    pub async fn insert_batch(
        &self,
        item_code: &str,
        batch_number: &str,
        qty: f64,
        location_code: &str,
    ) -> StoreResult<SourceBatch> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO item (code) VALUES (?1)")
            .bind(item_code)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO location (code) VALUES (?1)")
            .bind(location_code)
            .execute(&mut *tx)
            .await?;

        let incoming_id: i64 =
            sqlx::query_scalar("INSERT INTO incoming (number) VALUES (?1) RETURNING incoming_id")
                .bind(batch_number)
                .fetch_one(&mut *tx)
                .await?;
        let detail_id: i64 = sqlx::query_scalar(
            "INSERT INTO incoming_det (incoming_id, item_id, batch_number, qty)
                SELECT ?1, item_id, ?2, ?3 FROM item WHERE code = ?4
                RETURNING incoming_det_id",
        )
        .bind(incoming_id)
        .bind(batch_number)
        .bind(qty)
        .bind(item_code)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO packing (incoming_det_id, location_id, qty, code, batch_number, created_at)
                SELECT ?1, location_id, ?2, ?3, ?3, ?4 FROM location WHERE code = ?5",
        )
        .bind(detail_id)
        .bind(qty)
        .bind(batch_number)
        .bind(shared::util::now_millis())
        .bind(location_code)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.find_batch(batch_number).await
    }

    /// Packed quantity of a box, `None` when the batch does not exist
    pub async fn pack_qty(&self, batch_number: &str) -> StoreResult<Option<f64>> {
        let qty = sqlx::query_scalar("SELECT qty FROM packing WHERE batch_number = ?1")
            .bind(batch_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(qty)
    }

    /// Number of audit rows recorded for splits
    pub async fn split_audit_count(&self) -> StoreResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM split_box")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

impl InventoryStore for SqliteInventoryStore {
    type Txn = SqliteSplitTxn;

    async fn find_batch(&self, batch_number: &str) -> StoreResult<SourceBatch> {
        sqlx::query_as::<_, SourceBatch>(
            "SELECT d.incoming_id, d.incoming_det_id AS detail_id, p.packing_id,
                    it.item_id, it.code AS item_code, d.qty AS incoming_qty,
                    p.qty AS pack_qty, p.batch_number, l.location_id,
                    l.code AS location_code
                FROM packing p
                INNER JOIN incoming_det d ON d.incoming_det_id = p.incoming_det_id
                INNER JOIN item it ON it.item_id = d.item_id
                INNER JOIN location l ON l.location_id = p.location_id
                WHERE p.batch_number = ?1",
        )
        .bind(batch_number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_number)))
    }

    async fn derived_batch_ids(&self, batch_number: &str) -> StoreResult<Vec<String>> {
        // Prefix compare rather than LIKE: batch numbers may contain `%` or `_`
        let ids = sqlx::query_scalar(
            "SELECT batch_number FROM packing
                WHERE substr(batch_number, 1, length(?1) + 1) = ?1 || '-'
                ORDER BY batch_number",
        )
        .bind(batch_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn begin(&self) -> StoreResult<SqliteSplitTxn> {
        Ok(SqliteSplitTxn {
            tx: self.pool.begin().await?,
        })
    }
}

/// One split's writes inside an sqlx transaction
pub struct SqliteSplitTxn {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction for SqliteSplitTxn {
    async fn update_source_quantity(
        &mut self,
        source: &SourceBatch,
        new_qty: f64,
        provenance: &str,
    ) -> StoreResult<()> {
        let rows = sqlx::query(
            "UPDATE packing SET qty = ?1 WHERE packing_id = ?2 AND ABS(qty - ?3) < ?4",
        )
        .bind(new_qty)
        .bind(source.packing_id)
        .bind(source.pack_qty)
        .bind(QTY_EPSILON)
        .execute(&mut *self.tx)
        .await?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "packing {} no longer holds {}",
                source.packing_id, source.pack_qty
            )));
        }

        let rows = sqlx::query(
            "UPDATE incoming_det SET qty = ?1, original_was = ?2 WHERE incoming_det_id = ?3",
        )
        .bind(new_qty)
        .bind(provenance)
        .bind(source.detail_id)
        .execute(&mut *self.tx)
        .await?;
        if rows.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("detail {}", source.detail_id)));
        }
        Ok(())
    }

    async fn insert_derived_unit(
        &mut self,
        source: &SourceBatch,
        unit: &DerivedUnit,
        provenance: &str,
        acting_user_id: i64,
    ) -> StoreResult<i64> {
        let detail_id: i64 = sqlx::query_scalar(
            "INSERT INTO incoming_det (incoming_id, item_id, batch_number, qty, original_was)
                VALUES (?1, ?2, ?3, ?4, ?5)
                RETURNING incoming_det_id",
        )
        .bind(source.incoming_id)
        .bind(source.item_id)
        .bind(&unit.batch_id)
        .bind(unit.quantity)
        .bind(provenance)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            "INSERT INTO packing (incoming_det_id, location_id, qty, code, batch_number, created_at, user_id)
                VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
        )
        .bind(detail_id)
        .bind(source.location_id)
        .bind(unit.quantity)
        .bind(&unit.batch_id)
        .bind(shared::util::now_millis())
        .bind(acting_user_id)
        .execute(&mut *self.tx)
        .await?;

        debug!(detail_id, batch_id = %unit.batch_id, "Inserted derived unit");
        Ok(detail_id)
    }

    async fn record_split_audit(
        &mut self,
        acting_user_id: i64,
        new_detail_id: i64,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO split_box (user_id, incoming_det_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(acting_user_id)
            .bind(new_detail_id)
            .bind(shared::util::now_millis())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteInventoryStore {
        // One connection: every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteInventoryStore::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_batch() {
        let store = store().await;
        let batch = store
            .insert_batch("ART-1", "HU123", 100.0, "A-01")
            .await
            .unwrap();

        assert_eq!(batch.item_code, "ART-1");
        assert_eq!(batch.pack_qty, 100.0);
        assert_eq!(batch.location_code, "A-01");
        assert_eq!(store.find_batch("HU123").await.unwrap(), batch);
        assert!(matches!(
            store.find_batch("HU999").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_split() {
        let store = store().await;
        let batch = store
            .insert_batch("ART-1", "HU123", 100.0, "A-01")
            .await
            .unwrap();
        let unit = DerivedUnit::new("HU123", 1, 60.0);

        let mut txn = store.begin().await.unwrap();
        txn.update_source_quantity(&batch, 40.0, "1 x 100")
            .await
            .unwrap();
        let id = txn
            .insert_derived_unit(&batch, &unit, "1 x 100", 7)
            .await
            .unwrap();
        txn.record_split_audit(7, id).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(store.pack_qty("HU123").await.unwrap(), Some(40.0));
        let new_box = store.find_batch("HU123-1").await.unwrap();
        assert_eq!(new_box.pack_qty, 60.0);
        assert_eq!(new_box.location_id, batch.location_id);
        assert_eq!(new_box.incoming_id, batch.incoming_id);
        assert_eq!(store.split_audit_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_inserts() {
        let store = store().await;
        let batch = store
            .insert_batch("ART-1", "HU123", 100.0, "A-01")
            .await
            .unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.update_source_quantity(&batch, 40.0, "1 x 100")
            .await
            .unwrap();
        txn.insert_derived_unit(&batch, &DerivedUnit::new("HU123", 1, 60.0), "1 x 100", 7)
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(store.pack_qty("HU123").await.unwrap(), Some(100.0));
        assert_eq!(store.pack_qty("HU123-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_batch_id_fails() {
        let store = store().await;
        let batch = store
            .insert_batch("ART-1", "HU123", 100.0, "A-01")
            .await
            .unwrap();
        store
            .insert_batch("ART-1", "HU123-1", 5.0, "A-01")
            .await
            .unwrap();

        let mut txn = store.begin().await.unwrap();
        let result = txn
            .insert_derived_unit(&batch, &DerivedUnit::new("HU123", 1, 60.0), "1 x 100", 7)
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_derived_batch_ids() {
        let store = store().await;
        store
            .insert_batch("ART-1", "HU12", 10.0, "A-01")
            .await
            .unwrap();
        for batch in ["HU1", "HU1-1", "HU1-3", "HU1-1-1", "HU12-1"] {
            store
                .insert_batch("ART-1", batch, 10.0, "A-01")
                .await
                .unwrap();
        }

        assert_eq!(
            store.derived_batch_ids("HU1").await.unwrap(),
            vec!["HU1-1", "HU1-1-1", "HU1-3"]
        );
        assert!(store.derived_batch_ids("HU9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_source_conflicts() {
        let store = store().await;
        let mut batch = store
            .insert_batch("ART-1", "HU123", 100.0, "A-01")
            .await
            .unwrap();
        batch.pack_qty = 80.0;

        let mut txn = store.begin().await.unwrap();
        let result = txn.update_source_quantity(&batch, 40.0, "1 x 80").await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        txn.rollback().await.unwrap();
    }
}
