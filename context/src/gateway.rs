//! HTTP client for the server context endpoints.
//!
//! ## Endpoints (relative to `gateway.base_url`)
//! - `GET  {context_path}`: `GetOperationalContext`
//! - `POST {select_path}`: `SetOperationalContext`, body `{profile, branch}`
//! - `GET  {secondary_resource_path}`: `GetSecondaryResourceStatus`
//!
//! Every failure is reported as a structured [`GatewayError`]; the status
//! code and transport error kind decide the variant, never the message.

use async_trait::async_trait;
use config::GatewayConfig;
use errors::GatewayError;
use pos_core::{
    ContextGateway, OperationalContextResponse, SecondaryResourceStatus, SetContextResponse,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// [`ContextGateway`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpContextGateway {
    http: Client,
    context_url: Url,
    select_url: Url,
    secondary_resource_url: Url,
    api_token: Option<String>,
}

impl HttpContextGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Transient {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            context_url: endpoint_url(&config.base_url, &config.context_path)?,
            select_url: endpoint_url(&config.base_url, &config.select_path)?,
            secondary_resource_url: endpoint_url(
                &config.base_url,
                &config.secondary_resource_path,
            )?,
            api_token: config.api_token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &Url,
    ) -> Result<T, GatewayError> {
        let endpoint_path = endpoint.path().to_string();
        debug!(endpoint = %endpoint_path, "Calling context gateway");

        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport_error(&endpoint_path, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(status_error(&endpoint_path, status, message));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(&endpoint_path, &e))?;

        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed {
            endpoint: endpoint_path,
            reason: e.to_string(),
        })
    }
}

fn endpoint_url(base_url: &str, path: &str) -> Result<Url, GatewayError> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| GatewayError::Malformed {
        endpoint: raw,
        reason: format!("invalid gateway URL: {e}"),
    })
}

fn transport_error(endpoint: &str, e: &reqwest::Error) -> GatewayError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else {
        "transport"
    };
    warn!(endpoint, kind, error = %e, "Context gateway request failed");
    GatewayError::Transient {
        reason: format!("{kind} error calling {endpoint}: {e}"),
    }
}

fn status_error(endpoint: &str, status: StatusCode, message: String) -> GatewayError {
    match status.as_u16() {
        404 => GatewayError::NotFound {
            resource: endpoint.to_string(),
        },
        code @ (401 | 403) => GatewayError::Unauthorized { status: code },
        code @ (408 | 429 | 500..=599) => GatewayError::Transient {
            reason: format!("{endpoint} answered {code}"),
        },
        code => GatewayError::Rejected {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl ContextGateway for HttpContextGateway {
    async fn get_operational_context(&self) -> Result<OperationalContextResponse, GatewayError> {
        let request = self.http.get(self.context_url.clone());
        self.send_json(request, &self.context_url).await
    }

    async fn set_operational_context(
        &self,
        profile: &str,
        branch: &str,
    ) -> Result<SetContextResponse, GatewayError> {
        let request = self
            .http
            .post(self.select_url.clone())
            .json(&serde_json::json!({ "profile": profile, "branch": branch }));
        self.send_json(request, &self.select_url).await
    }

    async fn get_secondary_resource_status(
        &self,
    ) -> Result<SecondaryResourceStatus, GatewayError> {
        let request = self.http.get(self.secondary_resource_url.clone());
        match self.send_json(request, &self.secondary_resource_url).await {
            Ok(status) => Ok(status),
            Err(GatewayError::NotFound { .. }) => {
                debug!("Secondary resource not found");
                Ok(SecondaryResourceStatus::missing())
            }
            Err(e) => Err(e),
        }
    }
}


// ============================================================================
// Integration Tests (with wiremock)
// ============================================================================
