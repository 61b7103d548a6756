use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::cache::file::write_atomic;
use crate::records::docstore::{Collection, Collections};
use crate::records::valid_identifier;
use crate::{Error, Result};

/// Handles disk I/O for the [`DocStore`](crate::records::DocStore).
///
/// Each collection is stored in its own `.json` file, written atomically.
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { data_dir: dir })
    }

    /// Writes a single collection to its JSON file.
    pub fn save_collection(&self, name: &str, data: &Collection) -> Result<()> {
        if !valid_identifier(name) {
            return Err(Error::InvalidIdentifier);
        }
        let file_path = self.data_dir.join(format!("{}.json", name));
        let bytes = serde_json::to_vec_pretty(data)?;
        write_atomic(&file_path, &bytes)
    }

    /// Loads every collection found in the data directory. Unreadable files are
    /// skipped with a warning.
    pub fn load_all(&self) -> Result<Collections> {
        let mut all_data = HashMap::new();

        if !self.data_dir.exists() {
            return Ok(all_data);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| Error::Internal("Invalid filename".to_string()))?
                    .to_string();

                let content = match fs::read(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Could not read collection file {:?}: {}", path, e);
                        continue;
                    }
                };

                let collection: Collection = match serde_json::from_slice(&content) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Could not unmarshal collection from {:?}: {}", path, e);
                        continue;
                    }
                };

                all_data.insert(name, collection);
            }
        }

        Ok(all_data)
    }
}
