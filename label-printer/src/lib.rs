//! # label-printer
//!
//! ZPL label printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ZPL command building
//! - Network printing over a persistent TCP link (port 9100)
//! - Printer endpoint configuration
//! - Bounded retry with backoff
//!
//! Business logic (WHAT to print, and when) stays in application code:
//! - Box split labels → split-station
//!
//! ## Example
//!
//! ```ignore
//! use label_printer::{PrinterConfig, PrinterLink, Printer, encode_label};
//!
//! let mut link = PrinterLink::new(PrinterConfig::default())?;
//! link.connect().await?;
//!
//! let label = encode_label("ART-001", 40.0, "HU123")?;
//! link.send(&label).await?;
//! ```

mod config;
mod error;
mod printer;
mod retry;
mod zpl;

// Re-exports
pub use config::{DEFAULT_PORT, PrinterConfig};
pub use error::{ConfigError, LabelError, LabelResult, LinkError, LinkResult};
pub use printer::{LinkState, Printer, PrinterLink};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use zpl::{ZplBuilder, encode_label, format_quantity};
