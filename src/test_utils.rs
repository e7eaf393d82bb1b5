//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::descriptor::{BuildKind, ServiceDescriptor};

    /// Generate a valid service name (lowercase alphanumeric with hyphens)
    pub fn service_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a build kind
    pub fn build_kind() -> impl Strategy<Value = BuildKind> {
        prop_oneof![
            Just(BuildKind::Maven),
            Just(BuildKind::Go),
            Just(BuildKind::Node),
        ]
    }

    /// Generate an acyclic service set of up to `max` services
    ///
    /// Service `sN` only depends on services with a lower index, so the
    /// result never contains a cycle.
    pub fn acyclic_services(max: usize) -> impl Strategy<Value = Vec<ServiceDescriptor>> {
        (1..=max.max(1))
            .prop_flat_map(|count| {
                let deps = (0..count)
                    .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
                    .collect::<Vec<_>>();
                (proptest::collection::vec(build_kind(), count), deps)
            })
            .prop_map(|(kinds, deps)| {
                kinds
                    .into_iter()
                    .zip(deps)
                    .enumerate()
                    .map(|(i, (kind, deps))| {
                        let name = format!("s{i}");
                        let deps: Vec<String> = deps
                            .into_iter()
                            .filter(|&d| d < i)
                            .map(|d| format!("s{d}"))
                            .collect();
                        ServiceDescriptor::new(name.as_str(), kind, name.as_str()).depends_on(deps)
                    })
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_service_name_generator(name in service_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_acyclic_services_only_point_backwards(services in acyclic_services(10)) {
            for (i, service) in services.iter().enumerate() {
                for dep in &service.dependencies {
                    let index: usize = dep.trim_start_matches('s').parse().unwrap();
                    prop_assert!(index < i);
                }
            }
        }
    }
}
