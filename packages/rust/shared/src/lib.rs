//! Shared types, error model, and configuration for reconcile-works.
//!
//! This crate is the foundation depended on by all other crates in the workspace.
//! It provides:
//! - [`ReconcileError`] — the unified error type
//! - Domain types ([`LocalWork`], [`CandidateRecord`], [`MatchScore`], ...)
//! - Configuration ([`AppConfig`] and config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, LocConfig, MatchingConfig, WikidataConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate,
};
pub use error::{ReconcileError, Result};
pub use types::{
    AgentRef, AuthoritySource, BF_NS, BFLC_NS, CandidateRecord, Category, Contributor,
    LANGUAGE_VOCAB, LocalWork, MatchFields, MatchScore, NOTE_LABEL_FIELD, Note, ScoreField,
};
