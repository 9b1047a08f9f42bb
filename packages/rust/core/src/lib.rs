//! Reconciliation workflows for reconcile-works.
//!
//! This crate ties the connectors, matching, and document crates together:
//! each Work is run through [`orchestrator::Reconciler`], every search
//! attempt lands in the [`audit`] log, and [`pipeline::run`] writes the
//! rewritten document.

pub mod audit;
pub mod orchestrator;
pub mod pipeline;

pub use audit::AuditLog;
pub use orchestrator::{Attempt, AttemptOutcome, Reconciler, ResolvedWork, WorkResult, WorkState};
pub use pipeline::{
    OutputPaths, ProgressReporter, RunConfig, RunSummary, SilentProgress, output_paths, run,
};
