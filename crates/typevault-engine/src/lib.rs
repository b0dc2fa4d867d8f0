//! # typevault-engine
//!
//! The corpus engine: everything between "a vault root" and "a run
//! report".
//!
//! - [`corpus`]: vault scanning and the per-run document snapshot
//! - [`matcher`]: type inference and schema matching
//! - [`autofix`]: deterministic, idempotent repairs + read-only validation
//! - [`relocate`]: canonical-location policy and conflict-checked moves
//! - [`links`]: bidirectional back-reference reconciliation
//! - [`report`]: the machine-readable run report
//! - [`pipeline`]: one full run over a vault
//!
//! Schema and document state is constructed fresh per run and passed
//! explicitly through each phase; there are no ambient singletons, so
//! repeated and concurrent runs in tests are safe.

pub mod autofix;
pub mod corpus;
pub mod links;
pub mod matcher;
pub mod pipeline;
pub mod relocate;
pub mod report;

pub use corpus::{scan_vault, DocumentRecord, VaultOptions};
pub use pipeline::{run, RunMode, RunOptions};
pub use report::{FileReportV1, RunReportV1, RunSummaryV1, ViolationV1};
