//! Shared test fixtures for the terminal context workspace.
//!
//! Provides:
//! - [`ScriptedGateway`], an in-process [`pos_core::ContextGateway`] whose
//!   answers, delays and call counts are controlled by the test
//! - Canned server responses and sample contexts
//! - Unique id generation for isolating shared resources between tests

mod fixtures;
mod gateway;

pub use fixtures::*;
pub use gateway::*;
