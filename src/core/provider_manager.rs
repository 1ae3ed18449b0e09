//! Registry of providers and the currently active one

use crate::core::provider::{Provider, ProviderError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

/// Holds every registered provider and remembers which one serves requests
#[derive(Default)]
pub struct ProviderManager {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    selected: RwLock<Option<String>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, replacing any previous one
    pub fn register(&self, name: &str, provider: Arc<dyn Provider>) {
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), provider);
        debug!(provider = name, "Provider registered");
    }

    /// Make `name` the active provider
    pub fn select_provider(&self, name: &str) -> Result<(), ProviderError> {
        let provider = self.get(name).ok_or_else(|| ProviderError::NotFound {
            name: name.to_string(),
            available: self.list(),
        })?;

        *self.selected.write().unwrap_or_else(|e| e.into_inner()) = Some(name.to_string());
        debug!(
            provider_type = name,
            provider_name = provider.name(),
            "Provider selected"
        );
        Ok(())
    }

    /// The active provider, if one has been selected
    pub fn selected(&self) -> Option<Arc<dyn Provider>> {
        let selected = self
            .selected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        self.get(&selected)
    }

    pub fn selected_name(&self) -> Option<String> {
        self.selected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Registered provider names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect()
    }

    /// Initialize every provider; failures are logged and never fatal
    pub async fn init_all(&self) {
        for (name, provider) in self.snapshot() {
            match provider.init().await {
                Ok(()) => debug!(provider = %name, "Provider initialized successfully"),
                Err(e) if name == "gemini" => {
                    error!(
                        provider = %name,
                        error = %e,
                        tip1 = "__Secure-1PSID may be expired",
                        tip2 = "__Secure-1PSIDTS may be missing or invalid",
                        tip3 = "Visit https://gemini.google.com to refresh your cookies",
                        "Gemini provider initialization failed - check your cookies"
                    );
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Provider initialization failed");
                }
            }
        }
    }

    /// Close every provider, logging failures
    pub async fn close_all(&self) {
        for (name, provider) in self.snapshot() {
            if let Err(e) = provider.close().await {
                error!(provider = %name, error = %e, "Failed to close provider");
            }
        }
    }
}
