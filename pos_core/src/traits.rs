//! Core traits for the operational context system

use async_trait::async_trait;
use errors::GatewayError;

use crate::types::{OperationalContextResponse, SecondaryResourceStatus, SetContextResponse};

/// The server boundary consulted by the resolver and the guard.
///
/// Implementations must report failures through structured
/// [`GatewayError`] variants; callers never inspect error message text.
#[async_trait]
pub trait ContextGateway: Send + Sync {
    /// Fetch the context held by the server session plus the eligible
    /// profiles for the signed-in operator.
    async fn get_operational_context(&self) -> Result<OperationalContextResponse, GatewayError>;

    /// Persist a selection in the server session.
    async fn set_operational_context(
        &self,
        profile: &str,
        branch: &str,
    ) -> Result<SetContextResponse, GatewayError>;

    /// Fetch the secondary resource (e.g. the open shift). A server "not
    /// found" is reported as [`SecondaryResourceStatus::missing`], not as an
    /// error.
    async fn get_secondary_resource_status(&self)
    -> Result<SecondaryResourceStatus, GatewayError>;
}
