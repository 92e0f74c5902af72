//! Backend reachability check.

use std::sync::Arc;
use std::time::Duration;

use nexis_auth::{Authenticator, Credentials, HttpAuthTransport, SessionStore, join_api_path};
use tracing::{info, warn};
use url::Url;

use crate::redact_sensitive;

/// API root requested by [`check_connection`].
pub const API_ROOT_PATH: &str = "/api/v1/";

/// Result of one connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    /// URL that was requested.
    pub api_url: Url,
    /// HTTP status of the API root request, or the transport error text.
    pub api_status: Result<u16, String>,
    /// Whether the demo login succeeded.
    pub demo_login: bool,
}

impl ConnectionReport {
    /// Returns `true` when the API root returned a 2xx answer.
    pub fn api_healthy(&self) -> bool {
        matches!(self.api_status, Ok(status) if (200..300).contains(&status))
    }

    /// Returns `true` when both checks passed.
    pub fn all_passed(&self) -> bool {
        self.api_healthy() && self.demo_login
    }
}

/// Requests `GET <base>/api/v1/` and then attempts the demo login.
///
/// Both checks always run; neither failure is an error. The demo login runs
/// against a throwaway in-memory session, so the caller's stored session is
/// never replaced.
pub async fn check_connection(
    http: &reqwest::Client,
    base_url: &Url,
    timeout: Duration,
) -> ConnectionReport {
    let api_url = join_api_path(base_url, API_ROOT_PATH);
    let api_status = match http.get(api_url.clone()).timeout(timeout).send().await {
        Ok(response) => {
            info!(status = %response.status(), "api root answered");
            Ok(response.status().as_u16())
        }
        Err(error) => {
            let reason = redact_sensitive(&error.to_string());
            warn!(error = %reason, "api root unreachable");
            Err(reason)
        }
    };

    let demo_login = try_demo_login(http, base_url, timeout).await;

    ConnectionReport {
        api_url,
        api_status,
        demo_login,
    }
}

async fn try_demo_login(http: &reqwest::Client, base_url: &Url, timeout: Duration) -> bool {
    let authenticator = match Authenticator::for_base_url(
        base_url,
        Arc::new(HttpAuthTransport::new(http.clone())),
        Arc::new(SessionStore::in_memory()),
    ) {
        Ok(built) => built.with_timeout(timeout),
        Err(error) => {
            warn!(error = %error, "demo login has no usable endpoint");
            return false;
        }
    };

    match authenticator.try_login(&Credentials::demo()).await {
        Ok(_) => {
            info!("demo login check succeeded");
            true
        }
        Err(error) => {
            warn!(error = %redact_sensitive(&error.to_string()), "demo login check failed");
            false
        }
    }
}
