//! `Store` backed by a directory: one file per named record and one
//! sub-directory per slot area. Writes go through `write_atomic`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bottle_traits::{BoxError, Store};

use crate::error::{HwError, Result};
use crate::util::write_atomic;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

fn check_name(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if ok {
        Ok(name)
    } else {
        Err(HwError::InvalidKey(name.to_string()))
    }
}

fn read_opt(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(b) => Ok(Some(b)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "file store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.bin", check_name(key)?)))
    }

    fn slot_path(&self, area: &str, index: u32) -> Result<PathBuf> {
        Ok(self.dir.join(check_name(area)?).join(format!("{index:05}.bin")))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, BoxError> {
        Ok(read_opt(&self.record_path(key)?)?)
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let path = self.record_path(key)?;
        write_atomic(&path, bytes).map_err(HwError::from)?;
        Ok(())
    }

    fn get_slot(&self, area: &str, index: u32) -> std::result::Result<Option<Vec<u8>>, BoxError> {
        Ok(read_opt(&self.slot_path(area, index)?)?)
    }

    fn put_slot(&mut self, area: &str, index: u32, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let path = self.slot_path(area, index)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(HwError::from)?;
        }
        write_atomic(&path, bytes).map_err(HwError::from)?;
        Ok(())
    }
}
