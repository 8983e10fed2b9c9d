use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;

use crate::core::error::{DriverError, Result};
use crate::core::network::Network;

pub type Records<'a> = Box<dyn Iterator<Item = Result<Network>> + Send + 'a>;

/// Durable mirror of the network records, one record per network id.
pub trait StateStore: Send + Sync {
    /// Yields one item per stored record. Unreadable or inconsistent records
    /// come back as `MalformedRecord` and do not stop the iteration.
    fn load_all(&self) -> Result<Records<'_>>;

    /// Replaces the record for `network.id` wholesale.
    fn save(&self, network: &Network) -> Result<()>;

    /// Removing a record that does not exist succeeds.
    fn delete(&self, network_id: &str) -> Result<()>;
}

/// One pretty-printed JSON file per network under `root_path`.
#[derive(Debug)]
pub struct FileStore {
    root_path: PathBuf,
}

impl FileStore {
    pub fn init(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root_path).map_err(|e| {
            DriverError::persist_failed(
                &format!("state directory {}", root_path.display()),
                Some(Box::new(e)),
            )
        })?;

        Ok(FileStore { root_path })
    }

    #[cfg(test)]
    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn record_path(&self, network_id: &str) -> PathBuf {
        self.root_path.join(network_id)
    }

    fn load_record(path: &Path, name: &str) -> Result<Network> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DriverError::malformed(name, format!("read failed: {e}")))?;

        let network: Network = serde_json::from_str(&contents)
            .map_err(|e| DriverError::malformed(name, format!("decode failed: {e}")))?;
        network.validate(name)?;

        Ok(network)
    }
}

impl StateStore for FileStore {
    fn load_all(&self) -> Result<Records<'_>> {
        let entries = std::fs::read_dir(&self.root_path).map_err(|e| {
            DriverError::persist_failed(
                &format!("state directory {}", self.root_path.display()),
                Some(Box::new(e)),
            )
        })?;

        let records = entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(DriverError::malformed(
                        &self.root_path.display().to_string(),
                        format!("directory read failed: {e}"),
                    )))
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip in-flight temporaries and anything that is not a plain file.
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if name.starts_with('.') || !is_file {
                return None;
            }

            Some(Self::load_record(&entry.path(), &name))
        });

        Ok(Box::new(records))
    }

    fn save(&self, network: &Network) -> Result<()> {
        let what = format!("network {}", network.id);
        let contents = serde_json::to_vec_pretty(network)
            .map_err(|e| DriverError::persist_failed(&what, Some(Box::new(e))))?;
        debug!(
            "Marshaling data for network {}: {}",
            network.id,
            String::from_utf8_lossy(&contents)
        );

        let tmp_path = self.root_path.join(format!(".{}.tmp", network.id));
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&contents)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, self.record_path(&network.id))
        };

        write().map_err(|e| {
            debug!("Error writing state for network {}: {e}", network.id);
            let _ = std::fs::remove_file(&tmp_path);
            DriverError::persist_failed(&what, Some(Box::new(e)))
        })
    }

    fn delete(&self, network_id: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(network_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::persist_failed(
                &format!("network {network_id}"),
                Some(Box::new(e)),
            )),
        }
    }
}
