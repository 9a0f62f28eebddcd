//! Credential index
//!
//! Maps every recognized credential to its environment. Lookups happen on
//! every inbound request; inserts and removals only on environment
//! add/remove, so a readers-writer lock keeps the hot path cheap.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use flagrelay_config::{Credential, EnvConfig, EnvironmentId, MobileKey, SdkKey};

use crate::envcontext::EnvContext;
use crate::error::RelayError;

/// Three credential maps behind one readers-writer lock
#[derive(Default)]
pub struct CredentialIndex {
    state: RwLock<Maps>,
}

#[derive(Default)]
struct Maps {
    by_sdk_key: HashMap<SdkKey, Arc<EnvContext>>,
    by_mobile_key: HashMap<MobileKey, Arc<EnvContext>>,
    by_env_id: HashMap<EnvironmentId, Arc<EnvContext>>,
}

impl CredentialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve any credential kind to its environment
    pub fn lookup(&self, credential: &Credential) -> Option<Arc<EnvContext>> {
        let maps = self.state.read();
        match credential {
            Credential::SdkKey(key) => maps.by_sdk_key.get(key).cloned(),
            Credential::MobileKey(key) => maps.by_mobile_key.get(key).cloned(),
            Credential::EnvironmentId(id) => maps.by_env_id.get(id).cloned(),
        }
    }

    /// Index every credential of one environment
    ///
    /// Fails with `DuplicateCredential` if the SDK key is already taken;
    /// in that case nothing is inserted.
    pub fn insert(&self, config: &EnvConfig, env: Arc<EnvContext>) -> Result<(), RelayError> {
        let mut maps = self.state.write();
        if let Some(existing) = maps.by_sdk_key.get(&config.sdk_key) {
            return Err(RelayError::DuplicateCredential {
                env: existing.name().to_string(),
            });
        }
        maps.by_sdk_key
            .insert(config.sdk_key.clone(), Arc::clone(&env));
        if let Some(key) = &config.mobile_key {
            maps.by_mobile_key.insert(key.clone(), Arc::clone(&env));
        }
        if let Some(id) = &config.env_id {
            maps.by_env_id.insert(id.clone(), env);
        }
        Ok(())
    }

    /// Remove every credential of one environment; returns its context if
    /// the SDK key was known
    pub fn remove(&self, sdk_key: &SdkKey) -> Option<Arc<EnvContext>> {
        let mut maps = self.state.write();
        let env = maps.by_sdk_key.remove(sdk_key)?;
        if let Some(key) = &env.config().mobile_key {
            maps.by_mobile_key.remove(key);
        }
        if let Some(id) = &env.config().env_id {
            maps.by_env_id.remove(id);
        }
        Some(env)
    }

    /// Every indexed environment, one entry per SDK key
    pub fn all(&self) -> Vec<Arc<EnvContext>> {
        self.state.read().by_sdk_key.values().cloned().collect()
    }

    /// Number of indexed environments
    pub fn len(&self) -> usize {
        self.state.read().by_sdk_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty all three maps, returning the environments that were indexed
    pub fn clear(&self) -> Vec<Arc<EnvContext>> {
        let mut maps = self.state.write();
        let envs = maps.by_sdk_key.drain().map(|(_, env)| env).collect();
        maps.by_mobile_key.clear();
        maps.by_env_id.clear();
        envs
    }
}
