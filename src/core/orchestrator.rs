//! Run orchestration
//!
//! Wires the pieces together for one invocation: manifest → registry →
//! graph → scheduler → report. All configuration errors surface here before
//! any service is started.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::adapter::StageExecutor;
use crate::core::cache::CacheCoordinator;
use crate::core::events::EventSink;
use crate::core::graph::BuildGraph;
use crate::core::manifest::{BuildSettings, Manifest};
use crate::core::registry::ServiceRegistry;
use crate::core::report::RunReport;
use crate::core::runner::{RunnerSettings, StepRunner};
use crate::core::scheduler::{FailurePolicy, Scheduler, SchedulerConfig};
use crate::error::PolybuildError;
use crate::infra::dirs::PolybuildDirs;

/// A loaded manifest with its services registered
#[derive(Debug)]
pub struct Project {
    manifest: Manifest,
    root: PathBuf,
    registry: ServiceRegistry,
}

impl Project {
    /// Load `polybuild.toml` from `manifest_path`; service paths resolve
    /// against the manifest's directory
    pub fn load(manifest_path: &Path) -> Result<Self, PolybuildError> {
        let manifest = Manifest::load(manifest_path)?;
        let root = manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Self::from_manifest(manifest, root)
    }

    /// Register the services of an already parsed manifest
    pub fn from_manifest(manifest: Manifest, root: impl Into<PathBuf>) -> Result<Self, PolybuildError> {
        let root = root.into();
        let registry = ServiceRegistry::from_descriptors(manifest.descriptors(&root)?)?;
        Ok(Self {
            manifest,
            root,
            registry,
        })
    }

    /// Parsed manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Directory containing the manifest
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registered services
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Dependency graph over all services, or over `only` and their
    /// transitive dependencies when non-empty
    pub fn graph(&self, only: &[String]) -> Result<BuildGraph, PolybuildError> {
        let descriptors = if only.is_empty() {
            self.registry.descriptors().cloned().collect::<Vec<_>>()
        } else {
            self.registry.select(only)?.into_descriptors()
        };
        Ok(BuildGraph::build(descriptors)?)
    }

    /// Cache coordinator honouring `[build] cache_dir` and the namespace
    pub fn cache(&self, dirs: &PolybuildDirs) -> CacheCoordinator {
        let namespace = self.manifest.build.cache_namespace.clone();
        match &self.manifest.build.cache_dir {
            Some(dir) if dir.is_absolute() => CacheCoordinator::new(dir, namespace),
            Some(dir) => CacheCoordinator::new(self.root.join(dir), namespace),
            None => CacheCoordinator::from_dirs(dirs, namespace),
        }
    }
}

/// Command-line overrides for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Concurrency limit; falls back to the manifest, then the CPU count
    pub jobs: Option<usize>,
    /// Force fail-fast regardless of the manifest
    pub fail_fast: bool,
    /// Restrict the run to these services and their dependencies
    pub only: Vec<String>,
}

impl RunOptions {
    /// Effective scheduler settings
    pub fn scheduler_config(&self, settings: &BuildSettings) -> Result<SchedulerConfig, PolybuildError> {
        let jobs = self.jobs.or(settings.jobs).unwrap_or_else(num_cpus::get);
        let policy = if self.fail_fast || settings.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        };
        Ok(SchedulerConfig::new(jobs)?.with_policy(policy))
    }
}

/// Runs projects with a given executor and event sink
pub struct Orchestrator {
    executor: Arc<dyn StageExecutor>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(executor: Arc<dyn StageExecutor>, events: Arc<dyn EventSink>) -> Self {
        Self { executor, events }
    }

    /// Validate settings, build the graph and run it to completion
    ///
    /// Errors are configuration errors only; build failures are reported
    /// through the returned [`RunReport`].
    pub async fn run(
        &self,
        project: &Project,
        options: &RunOptions,
        dirs: &PolybuildDirs,
    ) -> Result<RunReport, PolybuildError> {
        let settings = &project.manifest().build;
        let config = options.scheduler_config(settings)?;
        let graph = project.graph(&options.only)?;

        tracing::info!(
            services = graph.len(),
            layers = graph.layers().len(),
            jobs = config.jobs(),
            "Starting build"
        );

        let runner = Arc::new(StepRunner::new(
            Arc::clone(&self.executor),
            project.cache(dirs),
            RunnerSettings::from_build_settings(settings),
        ));
        let scheduler = Scheduler::new(config, runner, Arc::clone(&self.events));
        Ok(scheduler.run(&graph).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    const MANIFEST: &str = r#"
[build]
jobs = 3

[[service]]
name = "catalog"
kind = "maven"
path = "catalog"

[[service]]
name = "ui"
kind = "node"
path = "ui"
depends_on = ["catalog"]

[[service]]
name = "search"
kind = "go"
path = "search"
"#;

    fn project() -> Project {
        Project::from_manifest(Manifest::from_toml(MANIFEST).unwrap(), "/work").unwrap()
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let project = project();
        let ui = project.registry().get("ui").unwrap();
        assert_eq!(ui.workdir, PathBuf::from("/work/ui"));
    }

    #[test]
    fn test_only_selects_transitive_dependencies() {
        let graph = project().graph(&["ui".to_string()]).unwrap();
        let names: Vec<_> = graph.nodes().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["catalog", "ui"]);
    }

    #[test]
    fn test_only_unknown_service() {
        let err = project().graph(&["nope".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            PolybuildError::Graph(GraphError::UnknownService { .. })
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_jobs_precedence() {
        let settings = project().manifest().build.clone();
        let config = RunOptions::default().scheduler_config(&settings).unwrap();
        assert_eq!(config.jobs(), 3);

        let options = RunOptions {
            jobs: Some(1),
            fail_fast: true,
            ..RunOptions::default()
        };
        let config = options.scheduler_config(&settings).unwrap();
        assert_eq!(config.jobs(), 1);
        assert_eq!(config.policy(), FailurePolicy::FailFast);
    }

    #[test]
    fn test_zero_jobs_is_configuration_error() {
        let options = RunOptions {
            jobs: Some(0),
            ..RunOptions::default()
        };
        let err = options
            .scheduler_config(&BuildSettings::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_relative_cache_dir_resolves_against_root() {
        let mut manifest = Manifest::from_toml(MANIFEST).unwrap();
        manifest.build.cache_dir = Some(PathBuf::from(".cache"));
        let project = Project::from_manifest(manifest, "/work").unwrap();
        let cache = project.cache(&PolybuildDirs::with_cache_dir("/elsewhere"));
        assert_eq!(cache.root(), Path::new("/work/.cache"));
    }
}
