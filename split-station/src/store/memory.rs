//! In-memory inventory store
//!
//! Same semantics as the SQLite store. A transaction works on a private
//! copy of the tables and swaps it in on commit, so dropping it discards
//! every staged write. Failure injection makes rollback paths testable.

use super::{InventoryStore, StoreError, StoreResult, StoreTransaction, is_derived_from, same_qty};
use parking_lot::{Mutex, RwLock};
use shared::models::{DerivedUnit, SourceBatch};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Incoming detail row
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub id: i64,
    pub incoming_id: i64,
    pub item_id: i64,
    pub batch_number: String,
    pub qty: f64,
    pub original_was: Option<String>,
}

/// Packing row (one physical box)
#[derive(Debug, Clone, PartialEq)]
pub struct PackingRow {
    pub id: i64,
    pub detail_id: i64,
    pub location_id: i64,
    pub qty: f64,
    pub code: String,
    pub batch_number: String,
    pub created_at: i64,
    pub user_id: Option<i64>,
}

/// Split audit row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAuditRow {
    pub user_id: i64,
    pub detail_id: i64,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    items: HashMap<i64, String>,
    locations: HashMap<i64, String>,
    details: BTreeMap<i64, DetailRow>,
    packings: BTreeMap<i64, PackingRow>,
    audits: Vec<SplitAuditRow>,
    next_id: i64,
    version: u64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Id of `code` in a lookup table, inserting it when new
fn intern(map: &mut HashMap<i64, String>, next_id: &mut i64, code: &str) -> i64 {
    if let Some((id, _)) = map.iter().find(|(_, c)| c.as_str() == code) {
        return *id;
    }
    *next_id += 1;
    map.insert(*next_id, code.to_string());
    *next_id
}

/// Injected failures, consumed by the next transaction that hits them
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Fail the n-th `insert_derived_unit` call of a transaction (0-based)
    pub fail_insert_at: Option<usize>,
    pub fail_audit: bool,
    pub fail_commit: bool,
}

/// In-memory inventory store
#[derive(Debug, Clone, Default)]
pub struct MemoryInventoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<Mutex<FailurePlan>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm failures for subsequent transactions
    pub fn inject_failures(&self, plan: FailurePlan) {
        *self.failures.lock() = plan;
    }

    /// Create a box with a fresh incoming document
    pub fn insert_batch(
        &self,
        item_code: &str,
        batch_number: &str,
        qty: f64,
        location_code: &str,
    ) -> SourceBatch {
        let mut guard = self.tables.write();
        let t = &mut *guard;

        let item_id = intern(&mut t.items, &mut t.next_id, item_code);
        let location_id = intern(&mut t.locations, &mut t.next_id, location_code);

        let incoming_id = t.next_id();
        let detail_id = t.next_id();
        let packing_id = t.next_id();

        t.details.insert(
            detail_id,
            DetailRow {
                id: detail_id,
                incoming_id,
                item_id,
                batch_number: batch_number.to_string(),
                qty,
                original_was: None,
            },
        );
        t.packings.insert(
            packing_id,
            PackingRow {
                id: packing_id,
                detail_id,
                location_id,
                qty,
                code: batch_number.to_string(),
                batch_number: batch_number.to_string(),
                created_at: shared::util::now_millis(),
                user_id: None,
            },
        );
        t.version += 1;

        SourceBatch {
            incoming_id,
            detail_id,
            packing_id,
            item_id,
            item_code: item_code.to_string(),
            incoming_qty: qty,
            pack_qty: qty,
            batch_number: batch_number.to_string(),
            location_id,
            location_code: location_code.to_string(),
        }
    }

    pub fn details(&self) -> Vec<DetailRow> {
        self.tables.read().details.values().cloned().collect()
    }

    pub fn packings(&self) -> Vec<PackingRow> {
        self.tables.read().packings.values().cloned().collect()
    }

    pub fn audits(&self) -> Vec<SplitAuditRow> {
        self.tables.read().audits.clone()
    }

    pub fn packing_by_batch(&self, batch_number: &str) -> Option<PackingRow> {
        self.tables
            .read()
            .packings
            .values()
            .find(|p| p.batch_number == batch_number)
            .cloned()
    }
}

impl InventoryStore for MemoryInventoryStore {
    type Txn = MemoryTxn;

    async fn find_batch(&self, batch_number: &str) -> StoreResult<SourceBatch> {
        let t = self.tables.read();
        let packing = t
            .packings
            .values()
            .find(|p| p.batch_number == batch_number)
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_number)))?;
        let detail = t
            .details
            .get(&packing.detail_id)
            .ok_or_else(|| StoreError::NotFound(format!("detail {}", packing.detail_id)))?;

        Ok(SourceBatch {
            incoming_id: detail.incoming_id,
            detail_id: detail.id,
            packing_id: packing.id,
            item_id: detail.item_id,
            item_code: t.items.get(&detail.item_id).cloned().unwrap_or_default(),
            incoming_qty: detail.qty,
            pack_qty: packing.qty,
            batch_number: packing.batch_number.clone(),
            location_id: packing.location_id,
            location_code: t
                .locations
                .get(&packing.location_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn derived_batch_ids(&self, batch_number: &str) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .tables
            .read()
            .packings
            .values()
            .filter(|p| is_derived_from(&p.batch_number, batch_number))
            .map(|p| p.batch_number.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn begin(&self) -> StoreResult<MemoryTxn> {
        let staged = self.tables.read().clone();
        let failures = std::mem::take(&mut *self.failures.lock());
        Ok(MemoryTxn {
            base_version: staged.version,
            staged,
            tables: Arc::clone(&self.tables),
            failures,
            inserts: 0,
        })
    }
}

/// Staged-write transaction over [`MemoryInventoryStore`]
pub struct MemoryTxn {
    staged: Tables,
    base_version: u64,
    tables: Arc<RwLock<Tables>>,
    failures: FailurePlan,
    inserts: usize,
}

impl StoreTransaction for MemoryTxn {
    async fn update_source_quantity(
        &mut self,
        source: &SourceBatch,
        new_qty: f64,
        provenance: &str,
    ) -> StoreResult<()> {
        let packing = self
            .staged
            .packings
            .get_mut(&source.packing_id)
            .ok_or_else(|| StoreError::NotFound(format!("packing {}", source.packing_id)))?;
        if !same_qty(packing.qty, source.pack_qty) {
            return Err(StoreError::Conflict(format!(
                "packing {} holds {}, expected {}",
                source.packing_id, packing.qty, source.pack_qty
            )));
        }
        packing.qty = new_qty;

        let detail = self
            .staged
            .details
            .get_mut(&source.detail_id)
            .ok_or_else(|| StoreError::NotFound(format!("detail {}", source.detail_id)))?;
        detail.qty = new_qty;
        detail.original_was = Some(provenance.to_string());
        Ok(())
    }

    async fn insert_derived_unit(
        &mut self,
        source: &SourceBatch,
        unit: &DerivedUnit,
        provenance: &str,
        acting_user_id: i64,
    ) -> StoreResult<i64> {
        let n = self.inserts;
        self.inserts += 1;
        if self.failures.fail_insert_at == Some(n) {
            return Err(StoreError::Database(format!(
                "injected failure inserting {}",
                unit.batch_id
            )));
        }
        if self
            .staged
            .packings
            .values()
            .any(|p| p.batch_number == unit.batch_id)
        {
            return Err(StoreError::Database(format!(
                "UNIQUE constraint failed: packing.batch_number ({})",
                unit.batch_id
            )));
        }

        let detail_id = self.staged.next_id();
        self.staged.details.insert(
            detail_id,
            DetailRow {
                id: detail_id,
                incoming_id: source.incoming_id,
                item_id: source.item_id,
                batch_number: unit.batch_id.clone(),
                qty: unit.quantity,
                original_was: Some(provenance.to_string()),
            },
        );

        let packing_id = self.staged.next_id();
        self.staged.packings.insert(
            packing_id,
            PackingRow {
                id: packing_id,
                detail_id,
                location_id: source.location_id,
                qty: unit.quantity,
                code: unit.batch_id.clone(),
                batch_number: unit.batch_id.clone(),
                created_at: shared::util::now_millis(),
                user_id: Some(acting_user_id),
            },
        );

        debug!(detail_id, packing_id, batch_id = %unit.batch_id, "Staged derived unit");
        Ok(detail_id)
    }

    async fn record_split_audit(
        &mut self,
        acting_user_id: i64,
        new_detail_id: i64,
    ) -> StoreResult<()> {
        if self.failures.fail_audit {
            return Err(StoreError::Database("injected audit failure".to_string()));
        }
        self.staged.audits.push(SplitAuditRow {
            user_id: acting_user_id,
            detail_id: new_detail_id,
        });
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        if self.failures.fail_commit {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }
        let mut tables = self.tables.write();
        if tables.version != self.base_version {
            return Err(StoreError::Conflict(
                "store changed during transaction".to_string(),
            ));
        }
        self.staged.version = self.base_version + 1;
        *tables = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (MemoryInventoryStore, SourceBatch) {
        let store = MemoryInventoryStore::new();
        let batch = store.insert_batch("ART-1", "HU123", 100.0, "A-01");
        (store, batch)
    }

    #[tokio::test]
    async fn test_find_batch() {
        let (store, batch) = seeded();
        let found = store.find_batch("HU123").await.unwrap();
        assert_eq!(found, batch);

        let missing = store.find_batch("HU999").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_derived_batch_ids() {
        let (store, _) = seeded();
        for batch in ["HU123-2", "HU1234-1", "HU123-1", "HU12-1"] {
            store.insert_batch("ART-1", batch, 5.0, "A-01");
        }

        assert_eq!(
            store.derived_batch_ids("HU123").await.unwrap(),
            vec!["HU123-1", "HU123-2"]
        );
    }

    #[tokio::test]
    async fn test_second_batch_reuses_item_and_location() {
        let (store, first) = seeded();
        let second = store.insert_batch("ART-1", "HU124", 10.0, "A-01");
        assert_eq!(first.item_id, second.item_id);
        assert_eq!(first.location_id, second.location_id);
        assert_ne!(first.detail_id, second.detail_id);
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let (store, batch) = seeded();
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

        assert_eq!(store.packing_by_batch("HU123").unwrap().qty, 40.0);
        let new_box = store.packing_by_batch("HU123-1").unwrap();
        assert_eq!(new_box.qty, 60.0);
        assert_eq!(new_box.location_id, batch.location_id);
        assert_eq!(new_box.user_id, Some(7));
        assert_eq!(
            store.audits(),
            vec![SplitAuditRow {
                user_id: 7,
                detail_id: id
            }]
        );
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let (store, batch) = seeded();
        {
            let mut txn = store.begin().await.unwrap();
            txn.update_source_quantity(&batch, 40.0, "1 x 100")
                .await
                .unwrap();
        }
        assert_eq!(store.packing_by_batch("HU123").unwrap().qty, 100.0);
        assert_eq!(store.details()[0].original_was, None);
    }

    #[tokio::test]
    async fn test_stale_source_conflicts() {
        let (store, mut batch) = seeded();
        batch.pack_qty = 90.0;

        let mut txn = store.begin().await.unwrap();
        let result = txn.update_source_quantity(&batch, 40.0, "1 x 90").await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflicts() {
        let (store, batch) = seeded();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first
            .update_source_quantity(&batch, 40.0, "1 x 100")
            .await
            .unwrap();
        second
            .update_source_quantity(&batch, 50.0, "1 x 100")
            .await
            .unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.packing_by_batch("HU123").unwrap().qty, 40.0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_one_shot() {
        let (store, batch) = seeded();
        store.inject_failures(FailurePlan {
            fail_insert_at: Some(0),
            ..FailurePlan::default()
        });
        let unit = DerivedUnit::new("HU123", 1, 60.0);

        let mut txn = store.begin().await.unwrap();
        assert!(
            txn.insert_derived_unit(&batch, &unit, "1 x 100", 7)
                .await
                .is_err()
        );
        drop(txn);

        let mut txn = store.begin().await.unwrap();
        assert!(
            txn.insert_derived_unit(&batch, &unit, "1 x 100", 7)
                .await
                .is_ok()
        );
    }
}
