//! # split-station
//!
//! Warehouse box splitting: one physical box becomes N boxes, each gets a
//! printed label, and the inventory records follow.
//!
//! ## Modules
//!
//! - [`split`]: validation, unit derivation and the print-then-persist orchestrator
//! - [`store`]: transactional inventory store (SQLite, in-memory)
//! - [`core`]: environment configuration
//! - [`utils`]: logging
//!
//! ## Example
//!
//! ```ignore
//! use split_station::{SplitOrchestrator, SqliteInventoryStore};
//! use label_printer::{PrinterConfig, PrinterLink};
//!
//! let store = SqliteInventoryStore::connect("sqlite:wms.db").await?;
//! let config = PrinterConfig::load_or_default("printer_config.json");
//! let orch = SplitOrchestrator::new(store, PrinterLink::new(config.clone())?, &config);
//!
//! let source = orch.find_batch("HU123").await?;
//! let outcome = orch.execute(&source, &[40.0, 35.0, 25.0], &user).await?;
//! ```

pub mod core;
pub mod split;
pub mod store;
pub mod utils;

// Re-exports
pub use crate::core::Config;
pub use split::{SplitError, SplitOrchestrator, SplitOutcome, SplitStage};
pub use store::{InventoryStore, MemoryInventoryStore, SqliteInventoryStore, StoreError};
