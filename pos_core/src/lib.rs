//! # Terminal Context Core
//!
//! Shared types and traits for resolving the operational context of a
//! point-of-sale terminal.
//!
//! This crate provides:
//! - The `OperationalContext` (profile, branch) pair and its validity rules
//! - Wire types for the server context endpoints
//! - The `ContextGateway` trait implemented by the HTTP client and test fakes
//! - A `Clock` abstraction so cache expiry can run on simulated time

pub mod clock;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use traits::ContextGateway;
pub use types::{
    ContextChange, ChangeOrigin, EligibleProfile, OperationalContext, OperationalContextResponse,
    Resolution, ResolutionSource, SecondaryResourceStatus, SelectionPayload, SetContextResponse,
    StampedContext,
};
