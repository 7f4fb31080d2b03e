//! Log medium backed by a host directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use canopy::storage::{LogMedium, StorageError};
use log::debug;

pub struct DirMedium {
    root: PathBuf,
    mounted: bool,
}

impl DirMedium {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            mounted: false,
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if self.mounted {
            Ok(self.root.join(name))
        } else {
            Err(StorageError::NotMounted)
        }
    }
}

fn storage_error(e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound,
        io::ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::Io,
    }
}

impl LogMedium for DirMedium {
    fn mount(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(storage_error)?;
        debug!("Mounted log directory {}", self.root.display());
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name)?)
            .map_err(storage_error)?;

        file.write_all(bytes).map_err(storage_error)?;
        file.sync_data().map_err(storage_error)
    }

    fn read_to_end(&mut self, name: &str, out: &mut Vec<u8>) -> Result<(), StorageError> {
        let mut file = fs::File::open(self.path(name)?).map_err(storage_error)?;
        file.read_to_end(out).map_err(storage_error)?;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.path(name)?).map_err(storage_error)
    }
}
