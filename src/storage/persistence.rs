//! Durable header store
//!
//! Headers are appended to a JSON-lines log that is synced on every `put`.
//! The chain head lives in its own small file, written to a temporary file
//! and atomically renamed into place. A `put` is therefore always durable
//! before a later `set_chain_head`, and a crash between the two leaves a
//! head whose successors are already on disk.

use crate::core::Header;
use crate::crypto::Sha256Hash;
use crate::storage::store::{BlockStore, StoreError, StoredHeader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub data_dir: PathBuf,
    pub headers_file: String,
    pub head_file: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".headerchain_data"),
            headers_file: "headers.jsonl".to_string(),
            head_file: "head.json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HeadRecord {
    hash: Sha256Hash,
    height: u64,
}

/// Append-only header log plus head pointer
pub struct FileBlockStore {
    config: FileStoreConfig,
    index: HashMap<Sha256Hash, StoredHeader>,
    chain_head: Sha256Hash,
    log: File,
    /// Length of the log up to its last complete record
    log_len: u64,
    /// Set when a failed append could not be rolled back
    failed: Option<String>,
}

impl FileBlockStore {
    /// Open the store in `config.data_dir`, seeding it with `genesis` if empty
    pub fn open(config: FileStoreConfig, genesis: &Header) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;

        let headers_path = config.data_dir.join(&config.headers_file);
        let index = Self::load_index(&headers_path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&headers_path)?;
        let log_len = file.metadata()?.len();

        let mut store = Self {
            config,
            index,
            chain_head: genesis.hash(),
            log: file,
            log_len,
            failed: None,
        };

        match store.read_head()? {
            Some(record) => {
                if !store.index.contains_key(&record.hash) {
                    return Err(StoreError::Corrupt(format!(
                        "head {} at height {} is not in the header log",
                        record.hash, record.height
                    )));
                }
                store.chain_head = record.hash;
            }
            None => {
                let stored = StoredHeader::genesis(genesis.clone());
                if !store.index.contains_key(&stored.hash()) {
                    store.put(stored.clone())?;
                }
                store.set_chain_head(stored)?;
            }
        }

        log::info!(
            "Opened header store at {} with {} headers",
            store.config.data_dir.display(),
            store.index.len()
        );
        Ok(store)
    }

    fn headers_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.headers_file)
    }

    fn head_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.head_file)
    }

    /// Read the header log, truncating a torn final record left by an
    /// interrupted append
    fn load_index(path: &Path) -> Result<HashMap<Sha256Hash, StoredHeader>, StoreError> {
        let mut index = HashMap::new();
        if !path.exists() {
            return Ok(index);
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut line = String::new();
        let mut valid_len = 0u64;
        let mut number = 0usize;
        let mut torn = None;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            number += 1;

            if let Some(e) = torn.take() {
                return Err(StoreError::Corrupt(format!(
                    "line {} of header log: {}",
                    number - 1,
                    e
                )));
            }

            if line.trim().is_empty() {
                valid_len += read as u64;
                continue;
            }
            match serde_json::from_str::<StoredHeader>(line.trim_end()) {
                Ok(stored) if line.ends_with('\n') => {
                    index.insert(stored.hash(), stored);
                    valid_len += read as u64;
                }
                Ok(_) => torn = Some("record is missing its terminator".to_string()),
                Err(e) => torn = Some(e.to_string()),
            }
        }

        if let Some(e) = torn {
            log::warn!("Truncating torn header record at line {}: {}", number, e);
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Ok(index)
    }

    fn read_head(&self) -> Result<Option<HeadRecord>, StoreError> {
        let path = self.head_path();
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.log.write_all(record)?;
        self.log.sync_data()?;
        self.log_len += record.len() as u64;
        Ok(())
    }

    /// Cut the log back to its last complete record after a failed append
    fn discard_partial_append(&mut self) {
        if let Err(e) = self.log.set_len(self.log_len) {
            log::error!("Cannot roll back partial header record: {}", e);
            self.failed = Some(e.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let path = self.headers_path();
        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StoreStats {
            header_count: self.index.len(),
            file_size,
            data_dir: self.config.data_dir.clone(),
        })
    }
}

impl BlockStore for FileBlockStore {
    fn get(&self, hash: &Sha256Hash) -> Result<Option<StoredHeader>, StoreError> {
        Ok(self.index.get(hash).cloned())
    }

    fn put(&mut self, block: StoredHeader) -> Result<(), StoreError> {
        let hash = block.hash();
        if self.index.contains_key(&hash) {
            return Ok(());
        }

        if let Some(reason) = &self.failed {
            return Err(StoreError::Corrupt(format!("header log is unusable: {}", reason)));
        }

        let mut record = serde_json::to_vec(&block)?;
        record.push(b'\n');
        if let Err(e) = self.append(&record) {
            self.discard_partial_append();
            return Err(e.into());
        }

        self.index.insert(hash, block);
        Ok(())
    }

    fn get_chain_head(&self) -> Result<StoredHeader, StoreError> {
        self.index
            .get(&self.chain_head)
            .cloned()
            .ok_or(StoreError::MissingHead)
    }

    fn set_chain_head(&mut self, head: StoredHeader) -> Result<(), StoreError> {
        if !self.index.contains_key(&head.hash()) {
            self.put(head.clone())?;
        }

        let record = HeadRecord {
            hash: head.hash(),
            height: head.height(),
        };

        // Write to temporary file first
        let temp_path = self.config.data_dir.join("head.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &record)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }

        // Atomic rename
        fs::rename(&temp_path, self.head_path())?;

        self.chain_head = record.hash;
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StoreStats {
    pub header_count: usize,
    pub file_size: u64,
    pub data_dir: PathBuf,
}
