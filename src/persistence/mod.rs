//! JSON persistence for trained objects.
//!
//! Objects are written whole; parent directories are created on save.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{NetGuardError, Result};

/// Serialize `obj` to `path`, creating missing parent directories.
pub fn save_object<T, P>(path: P, obj: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| NetGuardError::file(parent, e))?;
    }

    let file = File::create(path).map_err(|e| NetGuardError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, obj)?;
    writer.flush().map_err(|e| NetGuardError::file(path, e))?;

    info!("Saved object to {:?}", path);
    Ok(())
}

/// Deserialize an object previously written by [`save_object`].
pub fn load_object<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| NetGuardError::file(path, e))?;
    let obj = serde_json::from_reader(BufReader::new(file))?;
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn save_creates_parent_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/object.json");

        let mut obj = BTreeMap::new();
        obj.insert("alpha".to_string(), 0.5);
        save_object(&path, &obj).unwrap();

        let back: BTreeMap<String, f64> = load_object(&path).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_object::<BTreeMap<String, f64>, _>(dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, NetGuardError::File { .. }));
    }
}
