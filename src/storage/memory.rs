extern crate alloc;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{LogMedium, StorageError};

/// RAM-backed log medium.
///
/// With a capacity set, an append that does not fit writes as many bytes as
/// still fit and then fails with [`StorageError::Full`], the way a filesystem
/// running out of blocks tears the last write.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    files: BTreeMap<String, Vec<u8>>,
    capacity: Option<usize>,
    mounted: bool,
    fail_mount: bool,
    fail_remove: bool,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total number of bytes held across all files.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Make every later mount attempt fail.
    pub fn fail_mounts(&mut self, fail: bool) {
        self.fail_mount = fail;
    }

    /// Make every later remove fail with an I/O error.
    pub fn fail_removes(&mut self, fail: bool) {
        self.fail_remove = fail;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Raw content of a file, mounted or not.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Replace a file's raw content, mounted or not.
    pub fn put_file(&mut self, name: &str, bytes: &[u8]) {
        self.files.insert(name.to_string(), bytes.to_vec());
    }

    pub fn used_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    fn ensure_mounted(&self) -> Result<(), StorageError> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotMounted)
        }
    }
}

impl LogMedium for MemoryMedium {
    fn mount(&mut self) -> Result<(), StorageError> {
        if self.fail_mount {
            return Err(StorageError::Io);
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.ensure_mounted()?;

        let free = match self.capacity {
            Some(capacity) => capacity.saturating_sub(self.used_bytes()),
            None => usize::MAX,
        };
        let written = bytes.len().min(free);

        self.files
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(&bytes[..written]);

        if written < bytes.len() {
            Err(StorageError::Full)
        } else {
            Ok(())
        }
    }

    fn read_to_end(&mut self, name: &str, out: &mut Vec<u8>) -> Result<(), StorageError> {
        self.ensure_mounted()?;

        let content = self.files.get(name).ok_or(StorageError::NotFound)?;
        out.extend_from_slice(content);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        if self.fail_remove {
            return Err(StorageError::Io);
        }

        self.files
            .remove(name)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}
