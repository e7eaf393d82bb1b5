//! Service descriptor registry
//!
//! Static table of every service the orchestrator knows about, keyed by
//! identifier. The registry is where selections (`--only`) are resolved to
//! a dependency-closed subset before the graph is built.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::descriptor::ServiceDescriptor;
use crate::error::GraphError;

/// Table of service descriptors keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a descriptor list, rejecting duplicate identifiers
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ServiceDescriptor>,
    ) -> Result<Self, GraphError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register one descriptor
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<(), GraphError> {
        if self.services.contains_key(&descriptor.name) {
            return Err(GraphError::DuplicateService {
                name: descriptor.name,
            });
        }
        self.services.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Descriptors sorted by identifier
    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    /// Consume the registry, yielding descriptors sorted by identifier
    pub fn into_descriptors(self) -> Vec<ServiceDescriptor> {
        self.services.into_values().collect()
    }

    /// Restrict the registry to `names` plus everything they transitively depend on
    ///
    /// Services left out are excluded from the run and do not count towards
    /// the overall outcome.
    pub fn select(&self, names: &[String]) -> Result<Self, GraphError> {
        let mut keep = BTreeSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for name in names {
            if !self.services.contains_key(name) {
                return Err(GraphError::UnknownService { name: name.clone() });
            }
            stack.push(name);
        }

        while let Some(name) = stack.pop() {
            if !keep.insert(name.to_string()) {
                continue;
            }
            let Some(descriptor) = self.services.get(name) else {
                continue;
            };
            for dep in &descriptor.dependencies {
                if !self.services.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        service: name.to_string(),
                        dependency: dep.clone(),
                    });
                }
                stack.push(dep);
            }
        }

        Ok(Self {
            services: self
                .services
                .iter()
                .filter(|(name, _)| keep.contains(*name))
                .map(|(name, d)| (name.clone(), d.clone()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::BuildKind;

    fn svc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor::new(name, BuildKind::Go, name).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ServiceRegistry::from_descriptors([svc("a", &[]), svc("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateService { name: "a".into() });
    }

    #[test]
    fn test_select_pulls_transitive_dependencies() {
        let registry = ServiceRegistry::from_descriptors([
            svc("catalog", &[]),
            svc("cart", &["catalog"]),
            svc("orders", &[]),
            svc("ui", &["cart"]),
        ])
        .unwrap();

        let selected = registry.select(&["ui".to_string()]).unwrap();
        let names: Vec<_> = selected.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["cart", "catalog", "ui"]);
    }

    #[test]
    fn test_select_unknown_service() {
        let registry = ServiceRegistry::from_descriptors([svc("a", &[])]).unwrap();
        assert_eq!(
            registry.select(&["zzz".to_string()]).unwrap_err(),
            GraphError::UnknownService { name: "zzz".into() }
        );
    }
}
