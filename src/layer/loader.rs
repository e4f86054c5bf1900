//! Layer loading from archives, directories and loose class files
//!
//! Archive entries ending in `.class` become units (keyed by the entry name
//! without the suffix); everything else becomes a resource. `.jmod` files
//! carry a four byte header before the zip payload and keep classes under
//! `classes/`.

use super::resource::{LayerKind, ResourceLayer};
use crate::codec::reader::peek_class_name;
use crate::unit::{unit_name_from_entry, CLASS_SUFFIX};
use crate::{Error, Result};
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

const JMOD_MAGIC: &[u8] = b"JM\x01\x00";
const JMOD_CLASSES: &str = "classes/";
const VERSIONED_PREFIX: &str = "META-INF/versions/";
/// Upper bound on buffer space reserved from an entry's declared size
const PREALLOC_LIMIT: u64 = 1 << 20;

/// Load a layer from an archive, a directory or a single class file.
pub fn load_path(path: &Path, kind: LayerKind) -> Result<ResourceLayer> {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let layer = if path.is_dir() {
        load_directory(&name, path, kind)?
    } else if path.extension().and_then(|e| e.to_str()) == Some("class") {
        let bytes = std::fs::read(path)?;
        let mut layer = ResourceLayer::new(&name, kind);
        let class_name = peek_class_name(&bytes)
            .map_err(|e| Error::decode(path.display().to_string(), e.to_string()))?;
        layer.put_unit(class_name, bytes);
        layer
    } else {
        let bytes = std::fs::read(path)?;
        load_archive_bytes(&name, kind, &bytes)?
    };

    tracing::info!(
        "Loaded {} layer '{}' ({} units, {} resources)",
        kind,
        layer.name(),
        layer.unit_count(),
        layer.resource_count()
    );
    Ok(layer)
}

/// Load a named layer from a path (alias used by the CLI and config)
pub fn load_layer(path: impl AsRef<Path>, kind: LayerKind) -> Result<ResourceLayer> {
    load_path(path.as_ref(), kind)
}

/// Load a layer from in-memory archive bytes (jar, zip or jmod).
pub fn load_archive_bytes(name: &str, kind: LayerKind, bytes: &[u8]) -> Result<ResourceLayer> {
    let (payload, is_jmod) = match bytes.strip_prefix(JMOD_MAGIC) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };

    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let mut layer = ResourceLayer::new(name, kind);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        let mut content = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
        entry.read_to_end(&mut content)?;

        let class_entry = if is_jmod {
            entry_name.strip_prefix(JMOD_CLASSES)
        } else {
            Some(entry_name.as_str())
        };

        match class_entry.filter(|e| !e.starts_with(VERSIONED_PREFIX)).and_then(unit_name_from_entry) {
            Some(unit_name) => {
                layer.put_unit(unit_name, content);
            }
            None => {
                layer.insert_resource(entry_name, content);
            }
        }
    }

    Ok(layer)
}

fn load_directory(name: &str, root: &Path, kind: LayerKind) -> Result<ResourceLayer> {
    let mut layer = ResourceLayer::new(name, kind);

    // Build output directories are usually git-ignored, so filters stay off.
    let walker = ignore::WalkBuilder::new(root).standard_filters(false).build();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(path)?;

        match relative.strip_suffix(CLASS_SUFFIX) {
            Some(unit_name) if !unit_name.is_empty() => {
                layer.put_unit(unit_name, bytes);
            }
            _ => {
                layer.insert_resource(relative, bytes);
            }
        }
    }

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::archive_bytes;
    use crate::testing::class_bytes;
    use crate::unit::Unit;

    #[test]
    fn test_load_archive_splits_units_and_resources() {
        let units = vec![Unit::new("com/example/A", class_bytes("com/example/A", Some("java/lang/Object"), &[]))];
        let resources = vec![("META-INF/MANIFEST.MF".to_string(), b"Manifest-Version: 1.0\n".to_vec())];
        let bytes = archive_bytes(&units, &resources).unwrap();

        let layer = load_archive_bytes("app.jar", LayerKind::Library, &bytes).unwrap();
        assert!(layer.contains_unit("com/example/A"));
        assert!(layer.contains_resource("META-INF/MANIFEST.MF"));
        assert_eq!(layer.unit_count(), 1);
    }

    #[test]
    fn test_load_jmod_strips_header_and_prefix() {
        let units = vec![Unit::new("classes/java/lang/Object", class_bytes("java/lang/Object", None, &[]))];
        let mut bytes = JMOD_MAGIC.to_vec();
        bytes.extend(archive_bytes(&units, &[]).unwrap());

        let layer = load_archive_bytes("java.base.jmod", LayerKind::Runtime, &bytes).unwrap();
        assert!(layer.contains_unit("java/lang/Object"));
    }

    #[test]
    fn test_load_directory_and_loose_class() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("com").join("example");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("A.class"), class_bytes("com/example/A", None, &[])).unwrap();
        std::fs::write(dir.path().join("config.properties"), b"k=v").unwrap();

        let layer = load_path(dir.path(), LayerKind::Primary).unwrap();
        assert!(layer.contains_unit("com/example/A"));
        assert!(layer.contains_resource("config.properties"));

        let loose = load_path(&package.join("A.class"), LayerKind::Library).unwrap();
        assert!(loose.contains_unit("com/example/A"));
    }

    #[test]
    fn test_declared_entry_size_is_not_trusted() {
        let resources = vec![("data.bin".to_string(), b"small".to_vec())];
        let mut bytes = archive_bytes(&[], &resources).unwrap();
        // Claim an uncompressed size near 4 GiB in the central directory
        let central = bytes.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        if let Ok(layer) = load_archive_bytes("lying.jar", LayerKind::Library, &bytes) {
            assert_eq!(layer.resource("data.bin"), Some(&b"small"[..]));
        }
    }

    #[test]
    fn test_garbage_archive_fails() {
        assert!(load_archive_bytes("bad.jar", LayerKind::Library, b"not a zip").is_err());
    }
}
