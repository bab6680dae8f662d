//! CLI commands for the header chain
//!
//! Implements all command handlers for the CLI interface.

use crate::chain::{BlockChain, BlockStatus, ChainError};
use crate::core::{Block, Decodable, Encodable, Header, HEADER_SIZE};
use crate::params::{Network, NetworkParameters, ParamsRegistry};
use crate::storage::{FileBlockStore, FileStoreConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub params: Arc<NetworkParameters>,
    pub chain: BlockChain<FileBlockStore>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open (or create) the header store for `network` under `data_dir`
    pub fn new(registry: &ParamsRegistry, data_dir: &Path, network: Network) -> CliResult<Self> {
        let params = registry.get(network)?;
        let network_dir = data_dir.join(network.name());
        let config = FileStoreConfig {
            data_dir: network_dir.clone(),
            ..Default::default()
        };

        let store = FileBlockStore::open(config, params.genesis_header())?;
        let chain = BlockChain::new(Arc::clone(&params), store)?;

        Ok(Self {
            params,
            chain,
            data_dir: network_dir,
        })
    }
}

/// Print the genesis header of a network
pub fn cmd_genesis(registry: &ParamsRegistry, network: Network) -> CliResult<()> {
    let params = registry.get(network)?;
    let header = params.genesis_header();

    println!("🧱 Genesis block for {}", network);
    println!("   ├─ Hash: {}", header.hash());
    println!("   ├─ Merkle root: {}", header.merkle_root);
    println!("   ├─ Time: {} ({})", header.time, header.timestamp());
    println!("   ├─ Bits: {:08x}", header.bits);
    println!("   ├─ Nonce: {}", header.nonce);
    println!("   └─ Header: {}", hex::encode(header.to_bytes()));

    Ok(())
}

/// Import summary
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub connected: usize,
    pub side_chain: usize,
    pub orphaned: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Parse one line of an import file: a bare 80-byte header or a full block
fn parse_line(line: &str) -> CliResult<(Header, Option<Block>)> {
    if line.len() == HEADER_SIZE * 2 {
        Ok((Header::from_hex(line)?, None))
    } else {
        let block = Block::from_hex(line)?;
        Ok((block.header.clone(), Some(block)))
    }
}

/// Add every hex-encoded header or block in `file` to the chain
pub fn cmd_import(state: &AppState, file: &Path) -> CliResult<ImportStats> {
    let contents = fs::read_to_string(file)?;
    let mut stats = ImportStats::default();

    println!("📥 Importing headers from {:?}...", file);

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (header, block) = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("   ❌ Line {}: {}", number + 1, e);
                stats.rejected += 1;
                continue;
            }
        };

        let result = match block {
            Some(block) => state.chain.add_with_status(header, Some(block.transactions)),
            None => state.chain.add_with_status(header, None),
        };

        match result {
            Ok(BlockStatus::AddedToMainChain) | Ok(BlockStatus::CausedReorg { .. }) => {
                stats.connected += 1
            }
            Ok(BlockStatus::AddedToSideChain) => stats.side_chain += 1,
            Ok(BlockStatus::Orphan) => stats.orphaned += 1,
            Ok(BlockStatus::Duplicate) => stats.duplicates += 1,
            Err(ChainError::Verification(e)) => {
                println!("   ❌ Line {}: {}", number + 1, e);
                stats.rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("✅ Import complete!");
    println!("   ├─ Connected: {}", stats.connected);
    println!("   ├─ Side chain: {}", stats.side_chain);
    println!("   ├─ Orphaned: {}", stats.orphaned);
    println!("   ├─ Duplicates: {}", stats.duplicates);
    println!("   └─ Rejected: {}", stats.rejected);
    println!(
        "   🔗 Chain head: height {}",
        state.chain.best_chain_height()
    );

    Ok(stats)
}

/// Display chain information
pub fn cmd_info(state: &AppState) -> CliResult<()> {
    let head = state.chain.chain_head();

    println!("📊 Header Chain ({})", state.params.network);
    println!("   ├─ Height: {}", head.height());
    println!("   ├─ Head: {}", head.hash());
    println!("   ├─ Head time: {}", head.header().timestamp());
    println!("   ├─ Bits: {:08x}", head.header().bits);
    println!("   ├─ Chain work: {:x}", head.chain_work());
    println!("   ├─ Orphans: {}", state.chain.orphan_count());
    println!("   └─ Data directory: {:?}", state.data_dir);

    Ok(())
}

/// Estimate when the chain reaches `height`
pub fn cmd_estimate(state: &AppState, height: u64) -> CliResult<()> {
    let current = state.chain.best_chain_height();
    let estimate = state
        .chain
        .estimate_block_time(height)
        .ok_or_else(|| format!("height {} is beyond any representable date", height))?;

    println!("⏱️  Block {} estimate", height);
    println!("   ├─ Current height: {}", current);
    println!("   └─ Expected at: {}", estimate.format("%Y-%m-%d %H:%M:%S UTC"));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BLOCK_VERSION_GENESIS;

    #[test]
    fn test_import_headers_and_blocks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let registry = ParamsRegistry::new();
        let state = AppState::new(&registry, temp_dir.path(), Network::UnitTest).unwrap();

        let genesis = state.params.genesis_header().clone();
        let b1 = Block::create_next(&genesis, BLOCK_VERSION_GENESIS, &[0x02; 33], genesis.time + 600, 1);
        let b2 = Block::create_next(&b1.header, BLOCK_VERSION_GENESIS, &[0x02; 33], b1.header.time + 600, 2);

        let file = temp_dir.path().join("headers.txt");
        let contents = format!(
            "# unit test chain\n{}\n{}\n{}\nzz\n",
            hex::encode(b1.header.to_bytes()),
            hex::encode(b2.to_bytes()),
            hex::encode(b1.header.to_bytes()),
        );
        fs::write(&file, contents).unwrap();

        let stats = cmd_import(&state, &file).unwrap();
        assert_eq!(
            stats,
            ImportStats {
                connected: 2,
                duplicates: 1,
                rejected: 1,
                ..Default::default()
            }
        );
        assert_eq!(state.chain.best_chain_height(), 2);
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let registry = ParamsRegistry::new();

        let head = {
            let state = AppState::new(&registry, temp_dir.path(), Network::UnitTest).unwrap();
            let genesis = state.params.genesis_header().clone();
            let b1 = Block::create_next(&genesis, BLOCK_VERSION_GENESIS, &[0x02; 33], genesis.time + 600, 1);
            assert!(state.chain.add_block(b1.clone()).unwrap());
            b1.hash()
        };

        let state = AppState::new(&registry, temp_dir.path(), Network::UnitTest).unwrap();
        assert_eq!(state.chain.chain_head().hash(), head);
        assert!(cmd_info(&state).is_ok());
        assert!(cmd_estimate(&state, 10).is_ok());
        assert!(cmd_estimate(&state, u64::MAX).is_err());
    }
}
