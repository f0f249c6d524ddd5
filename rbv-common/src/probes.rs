//! Per-service health probes.
//!
//! The database and cache are probed through `docker exec`, the search index
//! and the application over HTTP. Each probe answers "healthy right now?";
//! retrying is the poller's job.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::VerifyConfig;
use crate::process::{CommandSpec, run_command};

const DOCKER: &str = "docker";

/// Managed services, in readiness order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Database,
    Cache,
    SearchIndex,
    Application,
}

impl ServiceKind {
    /// Dependency order: later services need the earlier ones.
    pub const ORDERED: [ServiceKind; 4] = [
        ServiceKind::Database,
        ServiceKind::Cache,
        ServiceKind::SearchIndex,
        ServiceKind::Application,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ServiceKind::Database => "Database",
            ServiceKind::Cache => "Cache",
            ServiceKind::SearchIndex => "Search index",
            ServiceKind::Application => "Application",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transport-level probe failure. Treated as "not yet healthy" while waiting.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP probe failed: {0}")]
    Http(String),
    #[error("Unexpected probe response: {0}")]
    Response(String),
}

/// Search cluster status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterHealth {
    Green,
    Yellow,
    Red,
    Unknown(String),
}

impl ClusterHealth {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "green" => ClusterHealth::Green,
            "yellow" => ClusterHealth::Yellow,
            "red" => ClusterHealth::Red,
            other => ClusterHealth::Unknown(other.to_string()),
        }
    }

    /// Yellow (unassigned replicas on a single node) is serviceable.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ClusterHealth::Green | ClusterHealth::Yellow)
    }
}

/// Application health endpoint status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppHealth {
    Up,
    Down,
    OutOfService,
    Unknown(String),
}

impl AppHealth {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UP" => AppHealth::Up,
            "DOWN" => AppHealth::Down,
            "OUT_OF_SERVICE" => AppHealth::OutOfService,
            other => AppHealth::Unknown(other.to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, AppHealth::Up)
    }
}

/// Container state as reported by `docker ps --format {{.Status}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running(String),
    Exited(String),
    Missing,
}

impl ContainerState {
    pub fn parse(status: &str) -> Self {
        let status = status.trim();
        if status.is_empty() {
            ContainerState::Missing
        } else if status.contains("Exited") {
            ContainerState::Exited(status.to_string())
        } else {
            ContainerState::Running(status.to_string())
        }
    }
}

/// Result of a single-shot probe, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unreachable(String),
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

/// One service's single-shot status.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceKind,
    pub state: HealthState,
}

/// Per-service health predicates.
pub trait ProbeSet: Send + Sync {
    /// Whether the service is healthy right now.
    fn probe(&self, service: ServiceKind) -> impl Future<Output = Result<bool, ProbeError>> + Send;
}

/// Probe every service once, in order.
pub async fn snapshot<P: ProbeSet>(probes: &P) -> Vec<ServiceStatus> {
    let mut statuses = Vec::with_capacity(ServiceKind::ORDERED.len());
    for service in ServiceKind::ORDERED {
        let state = match probes.probe(service).await {
            Ok(true) => HealthState::Healthy,
            Ok(false) => HealthState::Unhealthy,
            Err(e) => HealthState::Unreachable(e.to_string()),
        };
        statuses.push(ServiceStatus { service, state });
    }
    statuses
}

/// Probes for the docker-compose stack.
pub struct StackProbes {
    http: reqwest::Client,
    database_container: String,
    cache_container: String,
    app_container: String,
    search_url: String,
    base_url: String,
    command_timeout: Duration,
}

impl StackProbes {
    pub fn new(config: &VerifyConfig) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(config.stack.probe_timeout)
            .build()
            .map_err(|e| ProbeError::Http(e.to_string()))?;
        Ok(Self {
            http,
            database_container: config.stack.database_container.clone(),
            cache_container: config.stack.cache_container.clone(),
            app_container: config.stack.app_container.clone(),
            search_url: config.stack.search_url.trim_end_matches('/').to_string(),
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            command_timeout: config.stack.probe_timeout,
        })
    }

    fn docker(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(DOCKER, args).timeout(self.command_timeout)
    }

    async fn database(&self) -> bool {
        let spec = self.docker(&[
            "exec",
            self.database_container.as_str(),
            "pg_isready",
            "-h",
            "localhost",
            "-p",
            "5432",
        ]);
        run_command(&spec).await.succeeded_with("accepting connections")
    }

    async fn cache(&self) -> bool {
        let spec = self.docker(&["exec", self.cache_container.as_str(), "redis-cli", "ping"]);
        run_command(&spec).await.succeeded_with("PONG")
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ProbeError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProbeError::Response(format!("HTTP {}", response.status().as_u16())));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProbeError::Response(e.to_string()))
    }

    async fn search_index(&self) -> Result<bool, ProbeError> {
        let body = self
            .get_json(&format!("{}/_cluster/health", self.search_url))
            .await?;
        let status = ClusterHealth::parse(body["status"].as_str().unwrap_or_default());
        debug!(status = ?status, "Search cluster health");
        Ok(status.is_healthy())
    }

    async fn container_state(&self, container: &str) -> ContainerState {
        let filter = format!("name={container}");
        let spec = self.docker(&["ps", "--filter", filter.as_str(), "--format", "{{.Status}}"]);
        let result = run_command(&spec).await;
        if result.succeeded {
            ContainerState::parse(&result.output)
        } else {
            ContainerState::Missing
        }
    }

    async fn application(&self) -> Result<bool, ProbeError> {
        if let ContainerState::Exited(status) = self.container_state(&self.app_container).await {
            let logs = run_command(&self.docker(&["logs", "--tail", "20", self.app_container.as_str()])).await;
            warn!(
                container = %self.app_container,
                status = %status,
                logs = %logs.output,
                "Application container exited"
            );
            return Ok(false);
        }

        let body = self
            .get_json(&format!("{}/actuator/health", self.base_url))
            .await?;
        let status = AppHealth::parse(body["status"].as_str().unwrap_or_default());
        debug!(status = ?status, "Application health");
        Ok(status.is_healthy())
    }
}

impl ProbeSet for StackProbes {
    async fn probe(&self, service: ServiceKind) -> Result<bool, ProbeError> {
        match service {
            ServiceKind::Database => Ok(self.database().await),
            ServiceKind::Cache => Ok(self.cache().await),
            ServiceKind::SearchIndex => self.search_index().await,
            ServiceKind::Application => self.application().await,
        }
    }
}
