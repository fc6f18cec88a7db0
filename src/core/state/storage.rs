// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! File store base: one state file per store, an advisory lock on a
//! companion `.lock` file, and an mtime+size freshness stamp.
//!
//! Sibling worker processes share the same files; the stamp lets each
//! process answer `is_up_to_date()` with two metadata calls before paying
//! for a reload. Writers hold the exclusive lock for the full rewrite or
//! append; readers take the shared lock for a consistent snapshot.

use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::PathBuf,
    time::{Duration, SystemTime},
};
use thiserror::Error;

/// Lock acquisition poll interval.
const LOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(String),
    #[error("corrupt record in '{0}'")]
    Corrupt(&'static str),
    #[error("lock: {0}")]
    Lock(String),
}

impl StoreError {
    pub(crate) fn io(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Held advisory lock; released on drop.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Stamp {
    mtime: Option<SystemTime>,
    size: u64,
}

/// A single state file with locking and freshness tracking.
pub struct FileStore {
    name: &'static str,
    path: PathBuf,
    lock_path: PathBuf,
    stamp: Mutex<Stamp>,
}

impl FileStore {
    /// Open (and create if missing) `dir/name`.
    pub fn open(dir: &str, name: &'static str) -> Result<Self, StoreError> {
        let mut path = PathBuf::from(dir);
        std::fs::create_dir_all(&path).map_err(StoreError::io)?;
        path.push(name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io)?;
        let mut lock_path = path.clone();
        lock_path.set_extension("lock");
        Ok(Self { name, path, lock_path, stamp: Mutex::new(Stamp::default()) })
    }

    /// File name inside the storage directory.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn current_stamp(&self) -> Stamp {
        match std::fs::metadata(&self.path) {
            Ok(md) => Stamp { mtime: md.modified().ok(), size: md.len() },
            Err(_) => Stamp::default(),
        }
    }

    /// Cheap freshness check against the stamp recorded at the last load.
    pub fn is_up_to_date(&self) -> bool {
        let cached = *self.stamp.lock();
        cached != Stamp::default() && cached == self.current_stamp()
    }

    /// Forget the recorded stamp so the next access reloads.
    pub fn invalidate(&self) {
        *self.stamp.lock() = Stamp::default();
    }

    fn record_stamp(&self) {
        *self.stamp.lock() = self.current_stamp();
    }

    /// Whether the file is empty on disk.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(std::fs::metadata(&self.path).map_err(StoreError::io)?.len() == 0)
    }

    fn acquire(&self, exclusive: bool) -> Result<LockGuard, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        loop {
            let res = if exclusive {
                fs2::FileExt::try_lock_exclusive(&file)
            } else {
                fs2::FileExt::try_lock_shared(&file)
            };
            match res {
                Ok(()) => return Ok(LockGuard { file }),
                Err(_) => std::thread::sleep(LOCK_BACKOFF),
            }
        }
    }

    /// Read the whole file under the shared lock and record the stamp.
    pub fn read_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let _guard = self.acquire(false)?;
        let mut buf = Vec::new();
        File::open(&self.path)
            .map_err(StoreError::io)?
            .read_to_end(&mut buf)
            .map_err(StoreError::io)?;
        self.record_stamp();
        Ok(buf)
    }

    /// Rewrite the whole file under the exclusive lock.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let _guard = self.acquire(true)?;
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)
            .map_err(StoreError::io)?;
        f.write_all(bytes).map_err(StoreError::io)?;
        f.flush().map_err(StoreError::io)?;
        self.record_stamp();
        Ok(())
    }

    /// Append under the exclusive lock.
    pub fn append_bytes(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let _guard = self.acquire(true)?;
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(StoreError::io)?;
        f.write_all(bytes).map_err(StoreError::io)?;
        f.flush().map_err(StoreError::io)?;
        self.record_stamp();
        Ok(())
    }
}

/// Serialize rows into CSV bytes.
pub(crate) fn csv_to_bytes<I, R>(rows: I) -> Result<Vec<u8>, StoreError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for row in rows {
        w.write_record(row.into_iter().collect::<Vec<_>>())
            .map_err(|e| StoreError::Io(e.to_string()))?;
    }
    w.into_inner().map_err(|e| StoreError::Io(e.to_string()))
}

/// Parse CSV bytes into string rows.
pub(crate) fn csv_from_bytes(bytes: &[u8]) -> Result<Vec<Vec<String>>, StoreError> {
    let mut r = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for rec in r.records() {
        let rec = rec.map_err(|e| StoreError::Io(e.to_string()))?;
        rows.push(rec.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}
