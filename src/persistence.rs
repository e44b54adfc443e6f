// File: src/persistence.rs
use crate::core::class_map::{ClassMap, ClassMaps};
use crate::core::domain::DomainTable;
use crate::error::{FeatError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Read-only lookup resources shared by all featurizers, snapshotted as one
/// binary file so decoding can skip re-parsing the text sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub classes: ClassMaps,
    pub domains: DomainTable,
}

impl ResourceBundle {
    /// Parses the plain-text resources. Missing optional files leave the
    /// corresponding map empty.
    pub fn from_text_files(
        source_classes: Option<&Path>,
        target_classes: Option<&Path>,
        domains: Option<&Path>,
    ) -> Result<Self> {
        let source = source_classes.map(ClassMap::load).transpose()?.unwrap_or_default();
        let target = target_classes.map(ClassMap::load).transpose()?.unwrap_or_default();
        let domains = domains.map(DomainTable::load).transpose()?.unwrap_or_default();
        Ok(Self {
            classes: ClassMaps::new(source, target),
            domains,
        })
    }
}

/// Writes `bundle` atomically: a temp file in the destination directory is
/// filled and then renamed over `path`.
pub fn save_to_disk(bundle: &ResourceBundle, path: &Path) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir).map_err(|e| FeatError::io(parent_dir, e))?;

    let temp_file = NamedTempFile::new_in(parent_dir).map_err(|e| FeatError::io(parent_dir, e))?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        bincode::serialize_into(&mut writer, bundle)?;
        writer.flush().map_err(|e| FeatError::io(path, e))?;
    }
    temp_file
        .persist(path)
        .map_err(|e| FeatError::io(path, e.error))?;
    info!(
        path = %path.display(),
        source_classes = bundle.classes.source.len(),
        target_classes = bundle.classes.target.len(),
        domains = bundle.domains.len(),
        "resource bundle saved"
    );
    Ok(())
}

pub fn load_from_disk(path: &Path) -> Result<ResourceBundle> {
    let file = File::open(path).map_err(|e| FeatError::io(path, e))?;
    let reader = BufReader::new(file);
    let bundle: ResourceBundle = bincode::deserialize_from(reader)?;
    info!(path = %path.display(), "resource bundle loaded");
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Token;

    #[test]
    fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("resources.bin");
        let mut domains = DomainTable::new();
        domains.insert(3, "web", 1);
        let bundle = ResourceBundle {
            classes: ClassMaps::new(
                ClassMap::from_pairs([("haus", "N")]),
                ClassMap::from_pairs([("house", "NN")]),
            ),
            domains,
        };
        save_to_disk(&bundle, &path).unwrap();
        let loaded = load_from_disk(&path).unwrap();
        assert_eq!(loaded.classes.source.get(&Token::new("haus")).as_str(), "N");
        assert_eq!(loaded.classes.target.get(&Token::new("house")).as_str(), "NN");
        assert_eq!(loaded.domains.label(3), Some("web"));
    }

    #[test]
    fn text_files_build_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.classes");
        let domains = dir.path().join("inputs.domains");
        fs::write(&source, "haus\tN\nder\tD\n").unwrap();
        fs::write(&domains, "0 news\n").unwrap();

        let bundle = ResourceBundle::from_text_files(Some(source.as_path()), None, Some(domains.as_path())).unwrap();
        assert_eq!(bundle.classes.source.len(), 2);
        assert!(bundle.classes.target.is_empty());
        assert_eq!(bundle.domains.label(0), Some("news"));

        let missing = dir.path().join("absent.classes");
        assert!(matches!(
            ResourceBundle::from_text_files(Some(missing.as_path()), None, None),
            Err(FeatError::Io { .. })
        ));
    }

    #[test]
    fn missing_snapshot_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_from_disk(&dir.path().join("absent.bin")),
            Err(FeatError::Io { .. })
        ));
    }
}
