//! Split orchestrator
//!
//! Drives one split through `validating → deriving → printing →
//! persisting → committed`. Labels are printed before anything is written,
//! so a print failure leaves the store untouched. A persist failure after
//! printing rolls the store back but cannot un-print labels; those are
//! logged as orphaned for manual reconciliation.

use super::error::{PersistError, PrintError, PrintFailure, SplitError, SplitStage};
use super::guard::BatchLocks;
use super::validation::{derive_units_avoiding, validate};
use crate::store::{InventoryStore, StoreError, StoreResult, StoreTransaction};
use label_printer::{LinkResult, Printer, PrinterConfig, RetryError, RetryPolicy, encode_label};
use serde::Serialize;
use shared::models::{DerivedUnit, SourceBatch, User};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Result of a committed split
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitOutcome {
    /// Every unit, original first
    pub units: Vec<DerivedUnit>,
    /// Detail ids of the new boxes, in unit order (excludes the original)
    pub new_detail_ids: Vec<i64>,
}

/// Coordinates label printing and persistence for box splits
///
/// The printer link is held under an async mutex for a whole print phase,
/// so labels of concurrent splits never interleave on the wire.
pub struct SplitOrchestrator<S, P> {
    store: S,
    printer: Mutex<P>,
    policy: RetryPolicy,
    settle_delay: Duration,
    batches: BatchLocks,
}

impl<S: InventoryStore, P: Printer> SplitOrchestrator<S, P> {
    /// Build with retry budget and settle delay taken from the printer config
    pub fn new(store: S, printer: P, config: &PrinterConfig) -> Self {
        Self {
            store,
            printer: Mutex::new(printer),
            policy: config.retry_policy(),
            settle_delay: config.settle_delay(),
            batches: BatchLocks::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Exclusive access to the printer link, e.g. to reconfigure it
    pub async fn printer(&self) -> MutexGuard<'_, P> {
        self.printer.lock().await
    }

    /// Look up the box to split
    pub async fn find_batch(&self, batch_number: &str) -> StoreResult<SourceBatch> {
        self.store.find_batch(batch_number).await
    }

    /// Split `source` into `quantities` on behalf of `user`
    pub async fn execute(
        &self,
        source: &SourceBatch,
        quantities: &[f64],
        user: &User,
    ) -> Result<SplitOutcome, SplitError> {
        self.execute_with_cancel(source, quantities, user, &CancellationToken::new())
            .await
    }

    /// [`execute`](Self::execute) with cancellation between labels and retries
    ///
    /// Cancellation is only honoured while printing; once persistence starts
    /// the split runs to commit or rollback.
    #[instrument(skip_all, fields(batch = %source.batch_number, user_id = user.id))]
    pub async fn execute_with_cancel(
        &self,
        source: &SourceBatch,
        quantities: &[f64],
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<SplitOutcome, SplitError> {
        let _lease = self
            .batches
            .try_acquire(&source.batch_number)
            .ok_or_else(|| SplitError::BatchBusy(source.batch_number.clone()))?;

        debug!(stage = %SplitStage::Validating, count = quantities.len());
        let request =
            validate(source, quantities).inspect_err(|e| warn!(error = %e, "Split rejected"))?;

        debug!(stage = %SplitStage::Deriving);
        // Earlier splits of this box already own some suffixes
        let taken = self
            .store
            .derived_batch_ids(&source.batch_number)
            .await
            .map_err(SplitError::Lookup)?;
        let units = derive_units_avoiding(source, &request, &taken);

        debug!(stage = %SplitStage::Printing, units = units.len());
        self.print_all(&source.item_code, &units, cancel)
            .await
            .inspect_err(|e| {
                warn!(stage = %e.stage(), error = %e, "Split aborted before persisting")
            })?;

        debug!(stage = %SplitStage::Persisting);
        let new_detail_ids = self
            .persist(source, &units, user)
            .await
            .inspect_err(|e| {
                error!(
                    error = %e,
                    orphaned = ?units.iter().map(|u| u.batch_id.as_str()).collect::<Vec<_>>(),
                    "Split rolled back after labels were printed; labels need manual reconciliation"
                )
            })?;

        info!(stage = %SplitStage::Committed, units = units.len(), "Split committed");
        Ok(SplitOutcome {
            units,
            new_detail_ids,
        })
    }

    /// Print one label per unit, in order, retrying each within the budget
    ///
    /// Stops at the first unit whose budget runs out; later units are not
    /// attempted. Fails with [`SplitError::Print`] or [`SplitError::Cancelled`].
    pub async fn print_all(
        &self,
        item_code: &str,
        units: &[DerivedUnit],
        cancel: &CancellationToken,
    ) -> Result<(), SplitError> {
        let mut printer = self.printer.lock().await;

        for unit in units {
            if cancel.is_cancelled() {
                info!(unit = unit.index, "Printing cancelled");
                return Err(SplitError::Cancelled {
                    stage: SplitStage::Printing,
                });
            }

            let label = encode_label(item_code, unit.quantity, &unit.batch_id).map_err(|e| {
                PrintError {
                    unit_index: unit.index,
                    batch_id: unit.batch_id.clone(),
                    attempts: 0,
                    cause: PrintFailure::Label(e),
                }
            })?;

            let result = self
                .policy
                .run(cancel, async |attempt| {
                    self.print_attempt(&mut *printer, &label, attempt).await
                })
                .await;

            match result {
                Ok(()) => {
                    info!(unit = unit.index, batch_id = %unit.batch_id, "Label printed");
                }
                Err(RetryError::Exhausted { attempts, last }) => {
                    error!(unit = unit.index, batch_id = %unit.batch_id, attempts, error = %last, "Label retry budget exhausted");
                    return Err(PrintError {
                        unit_index: unit.index,
                        batch_id: unit.batch_id.clone(),
                        attempts,
                        cause: PrintFailure::Link(last),
                    }
                    .into());
                }
                Err(RetryError::Cancelled { attempts }) => {
                    info!(unit = unit.index, attempts, "Printing cancelled during backoff");
                    return Err(SplitError::Cancelled {
                        stage: SplitStage::Printing,
                    });
                }
            }
        }

        Ok(())
    }

    /// One attempt: make sure the link is up, send, then let the printer settle
    ///
    /// The first attempt trusts a successful probe; every retry reconnects.
    async fn print_attempt(&self, printer: &mut P, label: &[u8], attempt: u32) -> LinkResult<()> {
        if attempt > 1 || !printer.probe().await {
            debug!(attempt, "Connecting to printer");
            printer.connect().await?;
        }
        printer.send(label).await?;
        // No acknowledgement exists; give the printer time to take the job
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    /// Write the split in a single store transaction
    ///
    /// Any failure rolls back everything; dropping the transaction on an
    /// early return does the same.
    pub async fn persist(
        &self,
        source: &SourceBatch,
        units: &[DerivedUnit],
        user: &User,
    ) -> Result<Vec<i64>, PersistError> {
        let mut txn = self.store.begin().await?;

        match write_split(&mut txn, source, units, user).await {
            Ok(ids) => {
                txn.commit().await?;
                debug!(new_units = ids.len(), "Split transaction committed");
                Ok(ids)
            }
            Err(cause) => {
                if let Err(e) = txn.rollback().await {
                    warn!(error = %e, "Rollback failed; transaction dropped");
                }
                Err(PersistError { cause })
            }
        }
    }
}

async fn write_split<T: StoreTransaction>(
    txn: &mut T,
    source: &SourceBatch,
    units: &[DerivedUnit],
    user: &User,
) -> StoreResult<Vec<i64>> {
    let Some((original, new_units)) = units.split_first() else {
        return Err(StoreError::Database("split has no units".to_string()));
    };
    let provenance = source.provenance();

    txn.update_source_quantity(source, original.quantity, &provenance)
        .await?;

    let mut ids = Vec::with_capacity(new_units.len());
    for unit in new_units {
        let detail_id = txn
            .insert_derived_unit(source, unit, &provenance, user.id)
            .await?;
        txn.record_split_audit(user.id, detail_id).await?;
        ids.push(detail_id);
    }
    Ok(ids)
}
