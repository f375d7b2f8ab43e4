//! Versioned storage slots for fresh imports.
//!
//! Every import lands in its own directory `<base>/<prefix><n>`. The next
//! number is one past the highest number ever seen, either on disk or handed
//! out by this allocator, so a slot number is never reused.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SLOT_PREFIX: &str = "VM_";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create base folder {path}: {source}")]
    CreateBase {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create slot {path}: {source}")]
    CreateSlot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub number: u64,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct SlotAllocator {
    base_folder: PathBuf,
    prefix: String,
    high_water: Mutex<u64>,
}

impl SlotAllocator {
    pub fn new<P: AsRef<Path>>(base_folder: P, prefix: impl Into<String>) -> Self {
        Self {
            base_folder: base_folder.as_ref().to_path_buf(),
            prefix: prefix.into(),
            high_water: Mutex::new(0),
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number encoded in a child entry name, if it follows the slot convention.
    pub fn parse_slot_number(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(self.prefix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn next_slot_number(&self) -> Result<u64, StorageError> {
        let on_disk = self.highest_on_disk()?;
        let handed_out = *self.high_water.lock();
        Ok(on_disk.max(handed_out) + 1)
    }

    pub fn allocate_slot(&self) -> Result<Slot, StorageError> {
        let mut high_water = self.high_water.lock();
        let mut number = self.highest_on_disk()?.max(*high_water) + 1;

        loop {
            let path = self.base_folder.join(format!("{}{}", self.prefix, number));
            match fs::create_dir(&path) {
                Ok(()) => {
                    *high_water = number;
                    tracing::debug!("Allocated storage slot {}", path.display());
                    return Ok(Slot { number, path });
                }
                // Someone else created it between the scan and now.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => number += 1,
                Err(source) => return Err(StorageError::CreateSlot { path, source }),
            }
        }
    }

    fn highest_on_disk(&self) -> Result<u64, StorageError> {
        fs::create_dir_all(&self.base_folder).map_err(|source| StorageError::CreateBase {
            path: self.base_folder.clone(),
            source,
        })?;

        let entries = fs::read_dir(&self.base_folder).map_err(|source| StorageError::Scan {
            path: self.base_folder.clone(),
            source,
        })?;

        Ok(entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| self.parse_slot_number(name))
            })
            .max()
            .unwrap_or(0))
    }
}
