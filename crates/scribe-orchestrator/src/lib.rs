//! Orchestration engine for multi-section document generation.
//!
//! The engine coordinates a run over a fixed set of independently produced
//! sections: a decision loop picks the next phase, a dispatcher fans write and
//! review work out to parallel tasks behind a bulk-synchronous barrier, a
//! merge reducer folds the resulting patches into the run state, a
//! retry-bounded review loop gates each section, and a deterministic
//! aggregator assembles the accepted sections into the final artifact.
//!
//! Content generation, review judgment, profiling, and planning are external
//! capabilities behind narrow async traits; the engine only supplies the
//! control and data-flow discipline that makes them compose and terminate.

pub mod aggregator;
pub mod capabilities;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;
pub mod review;
pub mod state;

pub use capabilities::{
    DecisionPolicy, Planner, Profiler, ReviewRequest, SectionReviewer, SectionWriter,
    WriteRequest, WriterRouter,
};
pub use config::{DispatchConfig, EngineConfig};
pub use engine::{FinishReason, Orchestrator, RunReport, SectionReport};
pub use error::{OrchestratorError, Result};
pub use events::RunEvent;
pub use policy::RuleBasedPolicy;
pub use state::{Phase, RunState, StatePatch};
