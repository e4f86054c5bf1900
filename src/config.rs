use crate::codec::WriterFlags;
use crate::layer::{load_layer, LayerKind, ResourceLayer, RuntimeClasspath};
use crate::workspace::Workspace;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct JarscopeConfig {
    /// Directory or archive holding the project's own classes
    pub primary: Option<PathBuf>,
    /// Library archives in resolution order
    pub libraries: Vec<PathBuf>,
    /// Runtime archives; discovered from JAVA_HOME when empty
    pub runtime: Vec<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub writer_flags: WriterFlags,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("jarscope.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<JarscopeConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: JarscopeConfig =
        toml::from_str(&contents).with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &JarscopeConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    ensure_parent_dir(path)?;
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl JarscopeConfig {
    /// Command-line values override the file; libraries are appended
    pub fn merge(mut self, primary: Option<PathBuf>, libraries: Vec<PathBuf>, runtime: Vec<PathBuf>) -> Self {
        if primary.is_some() {
            self.primary = primary;
        }
        self.libraries.extend(libraries);
        if !runtime.is_empty() {
            self.runtime = runtime;
        }
        self
    }

    /// Load every configured layer and assemble a workspace
    pub fn open_workspace(&self) -> anyhow::Result<Workspace> {
        let primary = match &self.primary {
            Some(path) => load_layer(path, LayerKind::Primary)
                .with_context(|| format!("failed to load primary layer {}", path.display()))?,
            None => ResourceLayer::new("primary", LayerKind::Primary),
        };

        let libraries = self
            .libraries
            .iter()
            .map(|path| {
                load_layer(path, LayerKind::Library).with_context(|| format!("failed to load library {}", path.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut workspace = Workspace::new(primary, libraries).with_writer_flags(self.writer_flags);
        if !self.runtime.is_empty() {
            workspace = workspace.with_runtime(Arc::new(RuntimeClasspath::from_paths(self.runtime.clone())));
        }
        if let Some(snapshot) = &self.snapshot {
            workspace = workspace.with_snapshot_path(snapshot);
        }
        Ok(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OBJECT;
    use crate::snapshot::write_archive;
    use crate::testing::class_bytes;
    use crate::unit::Unit;

    #[test]
    fn test_round_trip_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jarscope.toml");
        let config = JarscopeConfig {
            primary: Some(PathBuf::from("build/classes")),
            libraries: vec![PathBuf::from("libs/a.jar")],
            writer_flags: WriterFlags::None,
            ..Default::default()
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &JarscopeConfig::default(), true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().unwrap().writer_flags, WriterFlags::ComputeMaxs);
    }

    #[test]
    fn test_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("none.toml"))).unwrap().is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "writer_flags = \"sometimes\"").unwrap();
        assert!(load_config(Some(&bad)).is_err());
    }

    #[test]
    fn test_merge_prefers_command_line() {
        let config = JarscopeConfig {
            primary: Some(PathBuf::from("a")),
            libraries: vec![PathBuf::from("x.jar")],
            ..Default::default()
        }
        .merge(Some(PathBuf::from("b")), vec![PathBuf::from("y.jar")], vec![]);
        assert_eq!(config.primary, Some(PathBuf::from("b")));
        assert_eq!(config.libraries, vec![PathBuf::from("x.jar"), PathBuf::from("y.jar")]);
        assert!(config.runtime.is_empty());
    }

    #[test]
    fn test_open_workspace_loads_layers() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.jar");
        let lib = dir.path().join("lib.jar");
        let rt = dir.path().join("rt.jar");
        write_archive(&app, &[Unit::new("com/example/App", class_bytes("com/example/App", Some("com/lib/Base"), &[]))]).unwrap();
        write_archive(&lib, &[Unit::new("com/lib/Base", class_bytes("com/lib/Base", Some(OBJECT), &[]))]).unwrap();
        write_archive(&rt, &[Unit::new(OBJECT, class_bytes(OBJECT, None, &[]))]).unwrap();

        let config = JarscopeConfig {
            primary: Some(app),
            libraries: vec![lib],
            runtime: vec![rt],
            snapshot: Some(dir.path().join("snap.jar")),
            writer_flags: WriterFlags::ComputeMaxs,
        };
        let ws = config.open_workspace().unwrap();
        assert_eq!(ws.snapshot_path(), dir.path().join("snap.jar"));
        let parents = ws.hierarchy_graph().all_parents("com/example/App").unwrap();
        assert!(parents.contains("com/lib/Base") && parents.contains(OBJECT));

        let missing = JarscopeConfig {
            libraries: vec![dir.path().join("nope.jar")],
            ..Default::default()
        };
        assert!(missing.open_workspace().is_err());
    }
}
