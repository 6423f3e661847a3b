//! Declarative orchestrator setup.
//!
//! ```json
//! {
//!   "stores": [
//!     { "key": "Counter", "class": "CounterStore", "args": { "start": 0 } }
//!   ],
//!   "actions": [
//!     { "key": "counter", "class": "CounterActions" }
//!   ]
//! }
//! ```
//!
//! Stores are created before action sets, each list in declaration order.
//! Store order is dispatch order.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::catalog::Catalog;
use crate::error::FluxError;
use crate::flux::Flux;

/// One store or action set to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub key: String,
    pub class: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FluxConfig {
    #[serde(default)]
    pub stores: Vec<ComponentConfig>,
    #[serde(default)]
    pub actions: Vec<ComponentConfig>,
}

impl FluxConfig {
    pub fn from_json_str(content: &str) -> Result<Self, FluxError> {
        let config: FluxConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, FluxError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), FluxError> {
        validate_section("stores", &self.stores)?;
        validate_section("actions", &self.actions)
    }
}

fn validate_section(section: &str, components: &[ComponentConfig]) -> Result<(), FluxError> {
    let mut keys = HashSet::new();
    for (index, component) in components.iter().enumerate() {
        if component.key.trim().is_empty() {
            return Err(FluxError::Config(format!(
                "{section}[{index}].key must not be empty"
            )));
        }
        if component.class.trim().is_empty() {
            return Err(FluxError::Config(format!(
                "{section}[{index}].class must not be empty"
            )));
        }
        if !keys.insert(component.key.as_str()) {
            return Err(FluxError::Config(format!(
                "{section}[{index}].key {} is declared more than once",
                component.key
            )));
        }
    }
    Ok(())
}

impl Flux {
    /// Build an orchestrator with everything `config` declares.
    pub fn from_config(catalog: &Catalog, config: &FluxConfig) -> Result<Flux, FluxError> {
        config.validate()?;
        let flux = Flux::new();
        for store in &config.stores {
            flux.create_store_from(catalog, store.key.as_str(), &store.class, &store.args)?;
        }
        for actions in &config.actions {
            flux.create_actions_from(catalog, actions.key.as_str(), &actions.class, &actions.args)?;
        }
        info!(
            stores = config.stores.len(),
            actions = config.actions.len(),
            "flux built from config"
        );
        Ok(flux)
    }
}
