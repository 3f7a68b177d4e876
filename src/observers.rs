//! Observer implementations for exporting counter snapshots.
//!
//! This module provides various ways to export the counters of a
//! [`Stats`](crate::Stats) context:
//!
//! - [`table`] - Pretty-print a snapshot as a table using the `tabled` crate
//! - [`json`] - Serialize a snapshot to JSON format
//! - [`prometheus`] - Export a snapshot in Prometheus exposition format
//! - [`opentelemetry`] - Export a live context via OpenTelemetry
//!
//! The first three render a [`StatsSnapshot`](crate::snapshot::StatsSnapshot)
//! taken with [`Stats::snapshot`](crate::Stats::snapshot), so the values are
//! summed once and every observer sees the same numbers.
//!
//! # Unified Error Handling
//!
//! All observers use a unified [`ObserverError`] type, allowing you to switch
//! between observers without changing error handling code.
//!
//! # Feature Flags
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `prometheus` - Enables the [`prometheus`] module
//! - `opentelemetry` - Enables the [`opentelemetry`] module
//! - `full` - Enables all observer modules
//!
//! # Example
//!
//! ```rust,ignore
//! use shardstat::observers::Result;
//! use shardstat::{stat_inc, Granularity};
//!
//! fn export_metrics() -> Result<()> {
//!     stat_inc!(requests);
//!     let snapshot = shardstat::global().snapshot(Granularity::Global);
//!
//!     #[cfg(feature = "prometheus")]
//!     {
//!         use shardstat::observers::prometheus::PrometheusObserver;
//!         let output = PrometheusObserver::new().render(&snapshot)?;
//!         println!("{}", output);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "prometheus")]
pub use error::PrometheusError;

#[cfg(feature = "opentelemetry")]
pub use error::OtelError;

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "prometheus")]
pub mod prometheus;

#[cfg(feature = "opentelemetry")]
pub mod opentelemetry;
