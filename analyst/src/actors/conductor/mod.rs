//! Conductor - supervisor-routed analysis runs
//!
//! A run alternates between the supervisor, which picks the next worker or
//! `FINISH`, and exactly one worker step that appends one message to the
//! run's `ConversationState`:
//!
//! ```text
//! RUNNING ──decide──> Worker(id) ──act──> RUNNING
//!    │
//!    ├──decide──> FINISH ──> FINISHED
//!    └── unroutable / fatal worker / turn ceiling / timeout ──> FAILED
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ractor::Actor;
//! use crate::actors::conductor::{ConductorActor, ConductorArguments, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(supervisor, workers, RunPolicy::default());
//! let args = ConductorArguments::new(Arc::new(orchestrator));
//! let (conductor_ref, _handle) = Actor::spawn(None, ConductorActor, args).await?;
//! ```

pub mod actor;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod supervisor;
pub mod workers;

#[cfg(test)]
mod tests;

pub use actor::{ConductorActor, ConductorArguments, ConductorState};
pub use protocol::{ConductorError, ConductorMsg};
pub use registry::WorkerRegistry;
pub use runtime::{Orchestrator, RunOutcome, RunPolicy};
pub use state::{ConversationState, Message, Role, RouteTarget, RoutingDecision};
pub use supervisor::{LlmSupervisor, SharedSupervisorPolicy, SupervisorPolicy};
pub use workers::{HarnessWorker, SharedWorkerAgent, WorkerAgent, WorkerError, WorkerFailurePolicy};
