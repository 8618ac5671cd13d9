//! Pod controller kinds
//!
//! Classifies object kinds by how they relate to Pods:
//! - direct controllers appear as the controller reference on a Pod
//! - indirect controllers own ReplicaSets, which in turn own Pods

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{IndexerError, Result};

/// Kinds that own Pods directly by default
pub const DEFAULT_DIRECT_KINDS: &[&str] = &[
    "ReplicaSet",
    "DaemonSet",
    "StatefulSet",
    "Job",
    "ReplicationController",
];

/// Kinds that own ReplicaSets by default
pub const DEFAULT_INDIRECT_KINDS: &[&str] = &["Deployment"];

/// How a kind controls Pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerClass {
    Direct,
    Indirect,
}

impl fmt::Display for ControllerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerClass::Direct => write!(f, "direct"),
            ControllerClass::Indirect => write!(f, "indirect"),
        }
    }
}

/// The set of kinds the resolver recognizes as pod controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerKinds {
    direct: BTreeSet<String>,
    indirect: BTreeSet<String>,
}

impl Default for ControllerKinds {
    fn default() -> Self {
        Self {
            direct: DEFAULT_DIRECT_KINDS.iter().map(|k| k.to_string()).collect(),
            indirect: DEFAULT_INDIRECT_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ControllerKinds {
    /// No recognized kinds at all
    pub fn empty() -> Self {
        Self {
            direct: BTreeSet::new(),
            indirect: BTreeSet::new(),
        }
    }

    /// Recognize `kind` as a direct pod controller (e.g. a CRD that creates Pods)
    pub fn with_direct(mut self, kind: impl Into<String>) -> Self {
        self.direct.insert(kind.into());
        self
    }

    /// Recognize `kind` as an owner of ReplicaSets
    pub fn with_indirect(mut self, kind: impl Into<String>) -> Self {
        self.indirect.insert(kind.into());
        self
    }

    pub fn classify(&self, kind: &str) -> Option<ControllerClass> {
        if self.indirect.contains(kind) {
            Some(ControllerClass::Indirect)
        } else if self.direct.contains(kind) {
            Some(ControllerClass::Direct)
        } else {
            None
        }
    }

    pub fn direct(&self) -> impl Iterator<Item = &str> {
        self.direct.iter().map(String::as_str)
    }

    pub fn indirect(&self) -> impl Iterator<Item = &str> {
        self.indirect.iter().map(String::as_str)
    }

    /// Reject empty kind names and kinds listed as both direct and indirect
    pub fn validate(&self) -> Result<()> {
        if self.direct.iter().chain(&self.indirect).any(|k| k.trim().is_empty()) {
            return Err(IndexerError::Configuration(
                "controller kind names must not be empty".to_string(),
            ));
        }
        let overlap: Vec<&str> = self
            .direct
            .intersection(&self.indirect)
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            return Err(IndexerError::Configuration(format!(
                "kinds listed as both direct and indirect pod controllers: {}",
                overlap.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let kinds = ControllerKinds::default();
        assert_eq!(kinds.classify("DaemonSet"), Some(ControllerClass::Direct));
        assert_eq!(kinds.classify("ReplicaSet"), Some(ControllerClass::Direct));
        assert_eq!(kinds.classify("Deployment"), Some(ControllerClass::Indirect));
        assert_eq!(kinds.classify("ConfigMap"), None);
        assert_eq!(kinds.classify("Pod"), None);
        // Kinds are case sensitive, as on the wire
        assert_eq!(kinds.classify("deployment"), None);
        assert!(kinds.validate().is_ok());
    }

    #[test]
    fn test_custom_kinds() {
        let kinds = ControllerKinds::default()
            .with_direct("CloneSet")
            .with_indirect("Rollout");
        assert_eq!(kinds.classify("CloneSet"), Some(ControllerClass::Direct));
        assert_eq!(kinds.classify("Rollout"), Some(ControllerClass::Indirect));
        assert!(kinds.direct().any(|k| k == "CloneSet"));
    }

    #[test]
    fn test_overlapping_kinds_rejected() {
        let kinds = ControllerKinds::empty()
            .with_direct("Deployment")
            .with_indirect("Deployment");
        let err = kinds.validate().unwrap_err();
        assert!(err.to_string().contains("Deployment"));
    }

    #[test]
    fn test_empty_kind_rejected() {
        let kinds = ControllerKinds::empty().with_direct(" ");
        assert!(matches!(
            kinds.validate(),
            Err(IndexerError::Configuration(_))
        ));
    }
}
