/*!
 * Resilience service: builds per-resource policies from configuration
 */

use bulwark_core_resilience::{
    ResilienceManager, ResilienceMetrics, ResilienceRegistry, RetryPolicy,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::BulwarkConfig;
use crate::error::{BulwarkError, Result};

/// Owns the registry for every configured resource and hands out managers.
///
/// All managers returned for the same name share one circuit breaker and one
/// bulkhead.
#[derive(Debug, Clone)]
pub struct ResilienceService {
    registry: ResilienceRegistry,
    retry: BTreeMap<String, RetryPolicy>,
}

impl ResilienceService {
    /// Build breakers, bulkheads and retry policies for each resource
    pub fn from_config(config: &BulwarkConfig) -> Result<Self> {
        let registry = ResilienceRegistry::new();
        let mut retry = BTreeMap::new();

        for resource in &config.resources {
            let wrap = |source| BulwarkError::Resilience {
                resource: resource.name.clone(),
                source,
            };

            if let Some(breaker) = &resource.circuit_breaker {
                registry
                    .breaker_or_insert(&resource.name, breaker.into())
                    .map_err(wrap)?;
            }
            if let Some(bulkhead) = &resource.bulkhead {
                registry
                    .bulkhead_or_insert(&resource.name, bulkhead.max_concurrent_operations)
                    .map_err(wrap)?;
            }

            let policy = RetryPolicy::new(config.retry_for(resource).to_retry_config())
                .map_err(wrap)?;
            debug!(
                resource = %resource.name,
                max_attempts = policy.max_attempts(),
                breaker = resource.circuit_breaker.is_some(),
                bulkhead = resource.bulkhead.is_some(),
                "Configured resource"
            );
            retry.insert(resource.name.clone(), policy);
        }

        info!(resources = retry.len(), "Resilience service ready");
        Ok(Self { registry, retry })
    }

    /// Manager for a configured resource
    pub fn manager(&self, name: &str) -> Result<ResilienceManager> {
        let policy = self
            .retry
            .get(name)
            .ok_or_else(|| BulwarkError::UnknownResource(name.to_string()))?;
        Ok(self.registry.manager(name, Some(policy.clone())))
    }

    /// Configured resource names, sorted
    pub fn resource_names(&self) -> Vec<String> {
        self.retry.keys().cloned().collect()
    }

    pub fn registry(&self) -> &ResilienceRegistry {
        &self.registry
    }

    /// Metrics for every configured resource, including its retry policy
    pub fn snapshot(&self) -> BTreeMap<String, ResilienceMetrics> {
        self.retry
            .keys()
            .filter_map(|name| self.manager(name).ok().map(|m| (name.clone(), m.metrics())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerSettings, BulkheadSettings, ResourceConfig, RetryOverride};
    use std::sync::Arc;

    fn config() -> BulwarkConfig {
        BulwarkConfig {
            resources: vec![
                ResourceConfig {
                    name: "payments".to_string(),
                    circuit_breaker: Some(BreakerSettings::default()),
                    bulkhead: Some(BulkheadSettings {
                        max_concurrent_operations: 2,
                    }),
                    retry: Some(RetryOverride {
                        max_attempts: Some(5),
                        ..Default::default()
                    }),
                },
                ResourceConfig {
                    name: "audit".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_managers_share_components() {
        let service = ResilienceService::from_config(&config()).unwrap();

        let a = service.manager("payments").unwrap();
        let b = service.manager("payments").unwrap();

        assert!(Arc::ptr_eq(
            a.circuit_breaker().unwrap(),
            b.circuit_breaker().unwrap()
        ));
        assert!(Arc::ptr_eq(a.bulkhead().unwrap(), b.bulkhead().unwrap()));
        assert_eq!(a.retry_policy().unwrap().max_attempts(), 5);
    }

    #[test]
    fn test_resource_without_gates_only_retries() {
        let service = ResilienceService::from_config(&config()).unwrap();
        let manager = service.manager("audit").unwrap();

        assert!(manager.circuit_breaker().is_none());
        assert!(manager.bulkhead().is_none());
        assert_eq!(manager.retry_policy().unwrap().max_attempts(), 3);
    }

    #[test]
    fn test_unknown_resource() {
        let service = ResilienceService::from_config(&config()).unwrap();
        assert!(matches!(
            service.manager("nope"),
            Err(BulwarkError::UnknownResource(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_snapshot_lists_every_resource() {
        let service = ResilienceService::from_config(&config()).unwrap();
        let snapshot = service.snapshot();

        assert_eq!(
            service.resource_names(),
            vec!["audit".to_string(), "payments".to_string()]
        );
        assert!(snapshot["audit"].retry.is_some());
        assert!(snapshot["audit"].bulkhead.is_none());
        assert_eq!(
            snapshot["payments"]
                .bulkhead
                .as_ref()
                .unwrap()
                .max_concurrent_operations,
            2
        );
    }

    #[test]
    fn test_invalid_settings_name_the_resource() {
        let mut config = config();
        config.resources[0].bulkhead = Some(BulkheadSettings {
            max_concurrent_operations: 0,
        });

        match ResilienceService::from_config(&config) {
            Err(BulwarkError::Resilience { resource, .. }) => assert_eq!(resource, "payments"),
            other => panic!("Expected Resilience error, got {:?}", other),
        }
    }
}
