use super::KeyValueStore;
use crate::error::{LoftError, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ENTRY_EXT: &str = ".kv";

// Everything that could be a path separator, a traversal, or awkward in a file name.
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'*')
    .add(b'.')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'|');

/// Directory-backed key-value store: one file per key.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(LoftError::Io)?;
        }
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    format!("{}{}", utf8_percent_encode(key, KEY_ENCODE_SET), ENTRY_EXT)
}

fn decode_key(file_name: &str) -> Option<String> {
    let encoded = file_name.strip_suffix(ENTRY_EXT)?;
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|k| k.into_owned())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(LoftError::Io)?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir()?;
        let target = self.entry_path(key);

        // Atomic write
        let tmp = self.root.join(format!(".entry-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, value).map_err(LoftError::Io)?;
        fs::rename(&tmp, target).map_err(LoftError::Io)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(LoftError::Io)?;
        Ok(true)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(LoftError::Io)? {
            let path = entry.map_err(LoftError::Io)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = decode_key(name) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
