pub mod agent_harness;
pub mod collaborator;
pub mod conductor;
pub mod model_config;
pub mod model_gateway;
pub mod rag;
pub mod search;

pub use conductor::{ConductorActor, ConductorArguments, ConductorMsg};
