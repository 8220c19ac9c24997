use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::layers::layer::Layer;
use crate::train::train_config::CompileConfig;

pub const MODEL_FILE: &str = "model.json";
pub const VARIABLES_FILE: &str = "variables.json";
pub const OPTIMIZER_FILE: &str = "optimizer.json";

/// Files a saved model owns inside its directory.
const MODEL_FILES: [&str; 3] = [MODEL_FILE, VARIABLES_FILE, OPTIMIZER_FILE];

/// How a model was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Sequential,
    Functional,
}

/// A fully serializable description of a model architecture plus the
/// configuration it was compiled with.
///
/// Stored as `model.json` next to the variables, so a saved directory is
/// enough to rebuild the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub kind: ModelKind,
    /// Layers in execution order.
    pub layers: Vec<Layer>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub compile: Option<CompileConfig>,
    /// Whether `optimizer.json` was written together with this file.
    #[serde(default)]
    pub has_optimizer_state: bool,
}

/// What `save` does when the target directory already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingMode {
    /// Refuse with `DirectoryExists`.
    #[default]
    FailIfExists,
    /// Replace the directory.
    Override,
    /// Replace the model's own files, keeping anything else in it. Model
    /// files not written this time are removed.
    Append,
}

/// Writes `files` (file name, JSON bytes) into `dir`.
///
/// The new directory content is assembled in a temporary sibling directory
/// and swapped in by renames. The previous directory is kept aside until the
/// swap succeeded and is put back otherwise, so a failure leaves either the
/// old or the new save, never a mix.
pub(crate) fn write_dir(dir: &Path, mode: WritingMode, files: &[(&str, Vec<u8>)]) -> Result<()> {
    let exists = dir.exists();
    if exists && mode == WritingMode::FailIfExists {
        return Err(ModelError::DirectoryExists(dir.to_path_buf()));
    }

    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new().prefix(".graphite-save-").tempdir_in(parent)?;
    if exists && mode == WritingMode::Append {
        carry_over(dir, staging.path())?;
    }

    for (name, content) in files {
        let mut writer = BufWriter::new(File::create(staging.path().join(name))?);
        writer.write_all(content)?;
        writer.flush()?;
    }

    if exists {
        swap_in(dir, staging.path(), parent)
    } else {
        fs::rename(staging.path(), dir)?;
        Ok(())
    }
}

/// Copies every entry of `from` except the model's own files into `to`.
fn carry_over(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().map_or(false, |n| MODEL_FILES.contains(&n)) {
            continue;
        }
        copy_tree(&entry.path(), &to.join(name))?;
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        fs::create_dir(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_tree(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}

/// Replaces `dir` with `staging`. The old directory is parked in a temporary
/// sibling, deleted once the new one is in place and restored if the
/// promotion fails.
fn swap_in(dir: &Path, staging: &Path, parent: &Path) -> Result<()> {
    let backup = tempfile::Builder::new().prefix(".graphite-old-").tempdir_in(parent)?;
    let previous = backup.path().join("previous");
    fs::rename(dir, &previous)?;
    if let Err(err) = fs::rename(staging, dir) {
        fs::rename(&previous, dir)?;
        return Err(err.into());
    }
    Ok(())
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Deserializes one JSON file of a saved model directory.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(ModelError::MissingFile(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn numbers(value: u32) -> BTreeMap<String, u32> {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), value);
        map
    }

    #[test]
    fn writing_modes() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("model");
        let first = to_json(&numbers(1)).unwrap();
        let second = to_json(&numbers(2)).unwrap();

        write_dir(&dir, WritingMode::FailIfExists, &[(MODEL_FILE, first.clone())]).unwrap();
        assert!(matches!(
            write_dir(&dir, WritingMode::FailIfExists, &[(MODEL_FILE, second.clone())]),
            Err(ModelError::DirectoryExists(_))
        ));

        fs::write(dir.join("notes.txt"), "keep me").unwrap();
        write_dir(&dir, WritingMode::Append, &[(MODEL_FILE, second.clone())]).unwrap();
        assert!(dir.join("notes.txt").exists());
        assert_eq!(read_json::<BTreeMap<String, u32>>(&dir.join(MODEL_FILE)).unwrap(), numbers(2));

        write_dir(&dir, WritingMode::Override, &[(VARIABLES_FILE, first.clone())]).unwrap();
        assert!(!dir.join("notes.txt").exists());
        assert!(!dir.join(MODEL_FILE).exists());

        let leftovers = fs::read_dir(root.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn append_drops_model_files_that_were_not_rewritten() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("model");
        let body = to_json(&numbers(1)).unwrap();
        write_dir(&dir, WritingMode::FailIfExists, &[(MODEL_FILE, body.clone()), (OPTIMIZER_FILE, body.clone())])
            .unwrap();
        fs::create_dir(dir.join("assets")).unwrap();
        fs::write(dir.join("assets").join("labels.txt"), "cat\ndog").unwrap();

        write_dir(&dir, WritingMode::Append, &[(MODEL_FILE, to_json(&numbers(2)).unwrap())]).unwrap();
        assert!(!dir.join(OPTIMIZER_FILE).exists());
        assert_eq!(fs::read_to_string(dir.join("assets").join("labels.txt")).unwrap(), "cat\ndog");
        assert_eq!(read_json::<BTreeMap<String, u32>>(&dir.join(MODEL_FILE)).unwrap(), numbers(2));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_save_keeps_the_previous_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("model");
        write_dir(&dir, WritingMode::FailIfExists, &[(MODEL_FILE, to_json(&numbers(1)).unwrap())]).unwrap();

        for mode in [WritingMode::Override, WritingMode::Append] {
            let broken = write_dir(&dir, mode, &[("missing/variables.json", to_json(&numbers(2)).unwrap())]);
            assert!(matches!(broken, Err(ModelError::Io(_))));
            assert_eq!(read_json::<BTreeMap<String, u32>>(&dir.join(MODEL_FILE)).unwrap(), numbers(1));
            assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let result = read_json::<ModelSpec>(&root.path().join(MODEL_FILE));
        assert!(matches!(result, Err(ModelError::MissingFile(_))));
    }
}
