//! Shared fixtures for app integration tests.

use std::path::Path;
use std::sync::Arc;

use nexis_app::{NexisClient, NexisConfig, UiProjection};
use nexis_auth::{SessionStore, TokenPair};
use nexis_ui::UiState;
use wiremock::MockServer;

/// Config pointed at `server` with fast polling and no mock delays.
#[allow(dead_code)]
pub fn test_config(server: &MockServer, session_dir: &Path) -> NexisConfig {
    NexisConfig {
        api_base_url: server.uri(),
        session_path: session_dir.join("session.json"),
        poll_interval_ms: 20,
        mock_step_delay_ms: 0,
        mock_analysis_pace_percent: 0,
        ..NexisConfig::default()
    }
}

/// Client holding an in-memory session with a known token.
#[allow(dead_code)]
pub fn signed_in_client(server: &MockServer) -> NexisClient {
    let session = Arc::new(SessionStore::in_memory());
    session.save(&TokenPair::new("app-token", None));
    let config = NexisConfig {
        api_base_url: server.uri(),
        poll_interval_ms: 20,
        mock_step_delay_ms: 0,
        mock_analysis_pace_percent: 0,
        ..NexisConfig::default()
    };
    NexisClient::with_session(config, session).expect("client should build")
}

/// Fresh projection for observing one flow.
#[allow(dead_code)]
pub fn projection() -> UiProjection {
    UiProjection::new(UiState::new("test"))
}
