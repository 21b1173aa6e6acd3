//! Component health for the liveness and readiness endpoints
//!
//! The pipeline marks the delivery-side components degraded when a run
//! cannot hand its result off, and healthy again on the next success.
//! Degraded components keep the service ready; an unhealthy one does not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still accepting work, but recent operations failed
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_changed: DateTime<Utc>,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_changed: Utc::now(),
        }
    }
}

/// Body of `GET /readyz` and the component view of the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    /// Worst status across all components
    fn overall(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const WORKER_POOL: &str = "worker_pool";
    pub const PERSISTENCE: &str = "persistence";
    pub const MEDIA_STORE: &str = "media_store";
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str) {
        self.set(name, ComponentHealth::with_status(ComponentStatus::Healthy, None))
            .await;
    }

    async fn set(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    /// Mark a component healthy; a no-op write is skipped to keep `last_changed` stable
    pub async fn set_healthy(&self, name: &str) {
        let already = self
            .components
            .read()
            .await
            .get(name)
            .is_some_and(|c| c.status == ComponentStatus::Healthy);
        if !already {
            self.register(name).await;
        }
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(
            name,
            ComponentHealth::with_status(ComponentStatus::Degraded, Some(message.into())),
        )
        .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(
            name,
            ComponentHealth::with_status(ComponentStatus::Unhealthy, Some(message.into())),
        )
        .await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthReport {
        let components = self.components.read().await.clone();
        HealthReport {
            status: HealthReport::overall(&components),
            components,
        }
    }

    pub async fn readiness(&self) -> Readiness {
        if !*self.ready.read().await {
            return Readiness {
                ready: false,
                reason: Some("Analyzer not yet initialized".to_string()),
            };
        }

        let report = self.health().await;
        let unhealthy = report
            .components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);

        match unhealthy {
            Some((name, _)) => Readiness {
                ready: false,
                reason: Some(format!("Component {} unhealthy", name)),
            },
            None => Readiness {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let report = registry.health().await;

        assert_eq!(report.status, ComponentStatus::Healthy);
        assert!(report.components.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_persistence_degrades_service() {
        let registry = HealthRegistry::new();
        registry.register(components::WORKER_POOL).await;
        registry.register(components::PERSISTENCE).await;

        registry
            .set_degraded(components::PERSISTENCE, "connection refused")
            .await;

        let report = registry.health().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(
            report.components[components::PERSISTENCE].message.as_deref(),
            Some("connection refused")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_wins_over_degraded() {
        let registry = HealthRegistry::new();
        registry.set_degraded(components::MEDIA_STORE, "slow").await;
        registry
            .set_unhealthy(components::WORKER_POOL, "dispatcher stopped")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_recovery_clears_message() {
        let registry = HealthRegistry::new();
        registry.set_degraded(components::PERSISTENCE, "503").await;
        registry.set_healthy(components::PERSISTENCE).await;

        let report = registry.health().await;
        assert_eq!(report.status, ComponentStatus::Healthy);
        assert!(report.components[components::PERSISTENCE].message.is_none());
    }

    #[tokio::test]
    async fn test_not_ready_until_initialized() {
        let registry = HealthRegistry::new();
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_degraded_service_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.set_degraded(components::PERSISTENCE, "timeout").await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::WORKER_POOL, "dispatcher stopped")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Component worker_pool unhealthy")
        );
    }
}
