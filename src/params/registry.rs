//! Memoized network parameters
//!
//! Building parameters hashes the genesis block (and, for the unit-test
//! network, searches for its proof of work), so each network is built at
//! most once per registry and shared as an `Arc`.

use crate::core::Header;
use crate::params::{Network, NetworkParameters, ParamsError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct ParamsRegistry {
    cache: RwLock<HashMap<Network, Arc<NetworkParameters>>>,
}

impl ParamsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for `network`, built on first request.
    ///
    /// Concurrent first callers serialize on the write lock; whoever gets it
    /// first builds and publishes, the rest find the published value.
    pub fn get(&self, network: Network) -> Result<Arc<NetworkParameters>, ParamsError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(params) = cache.get(&network) {
                return Ok(Arc::clone(params));
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(params) = cache.get(&network) {
            return Ok(Arc::clone(params));
        }

        let params = Arc::new(NetworkParameters::for_network(network)?);
        cache.insert(network, Arc::clone(&params));
        Ok(params)
    }

    /// Seed header for bootstrapping a fresh block store
    pub fn genesis(&self, network: Network) -> Result<Header, ParamsError> {
        Ok(self.get(network)?.genesis_header().clone())
    }

    pub fn is_cached(&self, network: Network) -> bool {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&network)
    }
}
