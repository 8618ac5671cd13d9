//! Configuration schema definitions
//!
//! Defines the structure of the configuration file using serde for serialization.

use std::time::Duration;

use kube::runtime::watcher;
use serde::{Deserialize, Serialize};

use crate::kinds::ControllerKinds;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector applied to both the Pod and the ReplicaSet watch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,

    /// How long to wait for the initial listings before giving up
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    /// Extra pod controller kinds on top of the built-in ones
    #[serde(default)]
    pub controller_kinds: ControllerKindsConfig,
}

/// Additional controller kinds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControllerKindsConfig {
    /// Kinds that own Pods directly (e.g. CRD workload controllers)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub direct: Vec<String>,

    /// Kinds that own ReplicaSets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indirect: Vec<String>,
}

fn default_sync_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            sync_timeout_secs: default_sync_timeout_secs(),
            controller_kinds: ControllerKindsConfig::default(),
        }
    }
}

impl Config {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    /// Built-in controller kinds extended with the configured ones
    pub fn controller_kinds(&self) -> ControllerKinds {
        let kinds = self
            .controller_kinds
            .direct
            .iter()
            .fold(ControllerKinds::default(), |kinds, kind| {
                kinds.with_direct(kind.clone())
            });
        self.controller_kinds
            .indirect
            .iter()
            .fold(kinds, |kinds, kind| kinds.with_indirect(kind.clone()))
    }

    /// Watch configuration shared by both collections
    pub fn watcher_config(&self) -> watcher::Config {
        let config = watcher::Config::default();
        match &self.label_selector {
            Some(selector) => config.labels(selector),
            None => config,
        }
    }
}
