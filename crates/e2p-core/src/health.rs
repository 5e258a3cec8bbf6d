//! Component health tracking.

use parking_lot::RwLock;
use std::collections::HashMap;

/// State of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Operating normally
    Healthy,
    /// Operational but impaired
    Degraded,
    /// Not operational
    Unhealthy,
    /// Not yet reported
    Unknown,
}

/// Health of one component, with an optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentHealth {
    pub state: ComponentState,
    pub detail: Option<String>,
}

/// Overall system health, rolled up from component states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Tracks the health of named components.
pub struct HealthCheck {
    components: RwLock<HashMap<String, ComponentHealth>>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component in the Unknown state.
    pub fn register(&self, name: &str) {
        self.set(name, ComponentState::Unknown, None);
    }

    pub fn mark_healthy(&self, name: &str) {
        self.set(name, ComponentState::Healthy, None);
    }

    pub fn mark_degraded(&self, name: &str, detail: &str) {
        self.set(name, ComponentState::Degraded, Some(detail.to_string()));
    }

    pub fn mark_unhealthy(&self, name: &str, detail: &str) {
        self.set(name, ComponentState::Unhealthy, Some(detail.to_string()));
    }

    fn set(&self, name: &str, state: ComponentState, detail: Option<String>) {
        self.components
            .write()
            .insert(name.to_string(), ComponentHealth { state, detail });
    }

    /// Health of one component, if registered.
    pub fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().get(name).cloned()
    }

    /// Snapshot of all component healths.
    pub fn components(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().clone()
    }

    /// Roll up component states: any Unhealthy wins, then any Degraded.
    pub fn overall(&self) -> HealthStatus {
        let components = self.components.read();
        let mut degraded = false;
        for health in components.values() {
            match health.state {
                ComponentState::Unhealthy => return HealthStatus::Unhealthy,
                ComponentState::Degraded => degraded = true,
                _ => {}
            }
        }
        if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Whether the system can accept traffic (healthy or degraded).
    pub fn is_operational(&self) -> bool {
        self.overall() != HealthStatus::Unhealthy
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let health = HealthCheck::new();
        health.register("buffer");
        health.register("sink");

        assert_eq!(
            health.component("buffer").unwrap().state,
            ComponentState::Unknown
        );
        assert_eq!(health.overall(), HealthStatus::Healthy);

        health.mark_healthy("buffer");
        health.mark_healthy("sink");
        assert_eq!(health.overall(), HealthStatus::Healthy);

        health.mark_degraded("sink", "slow uploads");
        assert_eq!(health.overall(), HealthStatus::Degraded);
        assert!(health.is_operational());

        health.mark_unhealthy("buffer", "store unreachable");
        assert_eq!(health.overall(), HealthStatus::Unhealthy);
        assert!(!health.is_operational());
    }

    #[test]
    fn test_unhealthy_beats_degraded() {
        let health = HealthCheck::new();
        health.mark_degraded("a", "x");
        health.mark_unhealthy("b", "y");
        assert_eq!(health.overall(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_recovery() {
        let health = HealthCheck::new();
        health.mark_unhealthy("buffer", "down");
        health.mark_healthy("buffer");
        assert_eq!(health.overall(), HealthStatus::Healthy);
        assert!(health.component("buffer").unwrap().detail.is_none());
    }

    #[test]
    fn test_unknown_component() {
        let health = HealthCheck::new();
        assert!(health.component("missing").is_none());
    }
}
