//! Content package validation.
//!
//! Packages are installed into a disposable in-memory repository while a set
//! of checks observes every step through a read-only view. Findings are
//! collected into a [`ScanReport`] judged against a minimum severity.

pub mod archive;
pub mod collector;
pub mod engine;
pub mod error;
pub mod models;
pub mod output;
pub mod parsers;
pub mod plugins;
pub mod repo;

pub use collector::ViolationCollector;
pub use engine::{PackageSource, Scanner};
pub use error::{ConfigError, HookError, InitError, ScanError};
pub use models::{ScanReport, Severity, Violation};
