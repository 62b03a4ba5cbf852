//! Chain dispatch
//!
//! Maps each [`ChainKind`] to the adapter serving it. Adding a chain means
//! registering an adapter here; the scheduler never matches on chains.

use std::collections::HashMap;
use std::sync::Arc;

use super::bitcoin::BitcoinAdapter;
use super::evm::EvmAdapter;
use super::solana::SolanaAdapter;
use super::tron::TronAdapter;
use super::{ChainAdapter, ChainKind};
use crate::config::Config;
use crate::error::{Error, Result};

/// Adapters keyed by chain
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainKind, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every supported chain from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(TronAdapter::new(config.tron.clone())?));
        registry.register(Arc::new(BitcoinAdapter::new(config.bitcoin.clone())?));
        registry.register(Arc::new(EvmAdapter::new(
            ChainKind::Ethereum,
            config.ethereum.clone(),
        )?));
        registry.register(Arc::new(EvmAdapter::new(ChainKind::Bsc, config.bsc.clone())?));
        registry.register(Arc::new(SolanaAdapter::new(config.solana.clone())));
        Ok(registry)
    }

    /// Register (or replace) the adapter for its chain
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    /// Adapter for `chain`
    pub fn get(&self, chain: ChainKind) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::UnsupportedChain(format!("no adapter registered for {}", chain)))
    }

    /// Chains with a registered adapter
    pub fn chains(&self) -> Vec<ChainKind> {
        let mut chains: Vec<_> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}
