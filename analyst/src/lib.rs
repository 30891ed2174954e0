//! Financial analyst - supervisor-routed multi-agent analysis service
//!
//! A supervisor model routes each query between a web `Search` worker and a
//! filing `DocAnalyst` worker until it decides to `FINISH`. Runs are owned by
//! the `ConductorActor` and exposed over a small REST API.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod config;
