//! Liveness probe for container health checks.

use tracing::warn;

use super::ApiClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
}

impl ProbeOutcome {
    /// 0 when healthy, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeOutcome::Healthy => 0,
            ProbeOutcome::Unhealthy(_) => 1,
        }
    }
}

/// Any 2xx from `/api/health` counts as healthy. The body is not inspected.
pub async fn probe(api: &ApiClient) -> ProbeOutcome {
    let url = api.url("/api/health");
    match api.http().get(&url).send().await {
        Ok(response) if response.status().is_success() => ProbeOutcome::Healthy,
        Ok(response) => {
            warn!(%url, status = %response.status(), "health check failed");
            ProbeOutcome::Unhealthy(format!("status {}", response.status()))
        }
        Err(e) => {
            warn!(%url, error = %e, "health check unreachable");
            ProbeOutcome::Unhealthy(e.to_string())
        }
    }
}
