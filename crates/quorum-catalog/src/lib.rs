//! Capability registry index and performance ledger for Quorum.
//!
//! The registry side turns a catalog snapshot into a validated, read-only
//! [`ProviderIndex`] that answers category and id lookups during
//! orchestration; catalog changes are whole-index swaps through
//! [`SharedIndex`]. The ledger side ([`PerformanceLedger`]) keeps rolling
//! per-provider success, latency, and quality statistics across
//! orchestration calls.
//!
//! # Main types
//!
//! - [`CatalogSource`] — Snapshot source of provider descriptions.
//! - [`StaticCatalog`] — In-memory catalog, optionally loaded from JSON.
//! - [`ProviderIndex`] — Validated category/id index over one snapshot.
//! - [`SharedIndex`] — Atomic whole-index swap handle.
//! - [`PerformanceLedger`] — Per-provider rolling statistics with per-id locks.

/// Validated in-memory index over a catalog snapshot.
pub mod index;
/// Rolling per-provider performance statistics.
pub mod ledger;
/// Catalog snapshot sources.
pub mod source;

pub use index::{ProviderIndex, SharedIndex};
pub use ledger::{InvocationOutcome, LedgerSnapshot, PerformanceLedger, PerformanceRecord};
pub use source::{CatalogSource, StaticCatalog};
