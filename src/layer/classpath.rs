//! Runtime classpath - the lazily populated fallback layer
//!
//! The runtime layer holds the host runtime's built-in classes. It is
//! populated on first use and read-only afterwards, so a single instance can
//! be shared by every workspace in the process.

use super::loader::load_path;
use super::resource::{LayerKind, ResourceLayer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

static SHARED: OnceLock<Arc<RuntimeClasspath>> = OnceLock::new();

type Loader = Box<dyn Fn() -> ResourceLayer + Send + Sync>;

/// Lazily populated runtime layer.
pub struct RuntimeClasspath {
    loader: Loader,
    layer: OnceLock<ResourceLayer>,
}

impl RuntimeClasspath {
    /// Create a classpath populated by `loader` on first access
    pub fn lazy(loader: impl Fn() -> ResourceLayer + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            layer: OnceLock::new(),
        }
    }

    /// Create an already populated classpath
    pub fn from_layer(mut layer: ResourceLayer) -> Self {
        layer.set_kind(LayerKind::Runtime);
        let cell = OnceLock::new();
        // A fresh cell always accepts its first value.
        let _ = cell.set(layer);
        Self {
            loader: Box::new(|| ResourceLayer::new("runtime", LayerKind::Runtime)),
            layer: cell,
        }
    }

    /// Create an empty classpath
    pub fn empty() -> Self {
        Self::from_layer(ResourceLayer::new("runtime", LayerKind::Runtime))
    }

    /// Create a classpath that merges the given archives on first access.
    ///
    /// Earlier paths win on name collisions. Unreadable archives are logged
    /// and skipped.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self::lazy(move || load_runtime(&paths))
    }

    /// Create a classpath from the archives of the current runtime
    pub fn discover() -> Self {
        let paths = discover_runtime_paths();
        if paths.is_empty() {
            tracing::warn!("No runtime classpath found (is JAVA_HOME set?); runtime types will be dangling");
        }
        Self::from_paths(paths)
    }

    /// The process-wide shared classpath, discovered on first call
    pub fn shared() -> Arc<RuntimeClasspath> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(RuntimeClasspath::discover())))
    }

    /// The populated layer; the first call runs the loader exactly once
    pub fn layer(&self) -> &ResourceLayer {
        self.layer.get_or_init(|| {
            let mut layer = (self.loader)();
            layer.set_kind(LayerKind::Runtime);
            tracing::debug!("Runtime classpath populated with {} units", layer.unit_count());
            layer
        })
    }

    /// Whether the loader has already run
    pub fn is_populated(&self) -> bool {
        self.layer.get().is_some()
    }
}

impl std::fmt::Debug for RuntimeClasspath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeClasspath")
            .field("populated", &self.is_populated())
            .finish()
    }
}

fn load_runtime(paths: &[PathBuf]) -> ResourceLayer {
    let mut merged = ResourceLayer::new("runtime", LayerKind::Runtime);
    for path in paths {
        match load_path(path, LayerKind::Runtime) {
            Ok(layer) => {
                for unit in layer.units() {
                    if !merged.contains_unit(unit.name()) {
                        merged.insert_unit(unit.clone());
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to load runtime archive {}: {}", path.display(), e),
        }
    }
    merged
}

/// Candidate runtime archives under `$JAVA_HOME`
pub fn discover_runtime_paths() -> Vec<PathBuf> {
    std::env::var_os("JAVA_HOME")
        .map(|home| runtime_paths_in(Path::new(&home)))
        .unwrap_or_default()
}

/// Runtime archives of a JDK/JRE installation, first match only
pub fn runtime_paths_in(java_home: &Path) -> Vec<PathBuf> {
    let candidates = [
        java_home.join("jmods").join("java.base.jmod"),
        java_home.join("jre").join("lib").join("rt.jar"),
        java_home.join("lib").join("rt.jar"),
    ];
    candidates.into_iter().find(|p| p.is_file()).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lazy_population_runs_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let classpath = Arc::new(RuntimeClasspath::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut layer = ResourceLayer::new("rt", LayerKind::Library);
            layer.put_unit("java/lang/Object", vec![0]);
            layer
        }));
        assert!(!classpath.is_populated());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cp = Arc::clone(&classpath);
                std::thread::spawn(move || cp.layer().contains_unit("java/lang/Object"))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(classpath.layer().kind(), LayerKind::Runtime);
    }

    #[test]
    fn test_runtime_paths_prefer_jmod() {
        let home = tempfile::tempdir().unwrap();
        assert!(runtime_paths_in(home.path()).is_empty());

        std::fs::create_dir_all(home.path().join("lib")).unwrap();
        std::fs::write(home.path().join("lib").join("rt.jar"), b"").unwrap();
        std::fs::create_dir_all(home.path().join("jmods")).unwrap();
        std::fs::write(home.path().join("jmods").join("java.base.jmod"), b"").unwrap();

        let paths = runtime_paths_in(home.path());
        assert_eq!(paths, vec![home.path().join("jmods").join("java.base.jmod")]);
    }

    #[test]
    fn test_missing_archive_yields_empty_layer() {
        let classpath = RuntimeClasspath::from_paths(vec![PathBuf::from("/nonexistent/rt.jar")]);
        assert_eq!(classpath.layer().unit_count(), 0);
    }
}
