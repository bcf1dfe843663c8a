// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod export;
pub mod metrics;
pub mod observe;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod scoring;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::EngineConfig;
pub use crate::coordinator::{AbortReason, CycleConfig, CycleOutcome, CycleReport};
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{EngineError, FailureKind, SourceError};
pub use crate::record::{RiskRecord, RiskRow};
pub use crate::registry::{Entity, EntityRegistry};
pub use crate::scoring::{MergedFields, RiskLevel};
