/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The node-provisioning seam.
//!
//! [`NodeProvider`] is how the scheduler learns which worker instances
//! exist and asks for more.  Real implementations (a VM-marketplace
//! provisioner, a cloud autoscaler) live outside this crate; the scheduler
//! treats every provider failure as non-fatal and continues with the nodes
//! it already knows.
//!
//! [`StaticNodeProvider`] is the in-crate implementation backing the
//! `nodes:` section of the settings file: a fixed inventory for
//! development and bench deployments.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::{NodeDescriptor, NodeSpec};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure reported by a provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The provider endpoint could not be reached.
    #[error("provider transport failure: {0}")]
    Transport(String),

    /// The provider refused the request (quota, invalid spec, unknown id).
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// This provider cannot create instances.
    #[error("node creation is not supported by this provider")]
    Unsupported,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Inventory operations against the provisioning layer.
///
/// Authoritative node existence is owned by the provider; the registry is
/// a cache of what the provider last reported plus live health.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// List every instance the provider currently knows about.
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, ProviderError>;

    /// Request one new instance.  Returns the descriptor of the created
    /// (possibly still unconfirmed) instance.
    async fn create_node(&self, spec: &NodeSpec) -> Result<NodeDescriptor, ProviderError>;

    /// Delete an instance by id.
    async fn delete_node(&self, id: &str) -> Result<(), ProviderError>;
}

// ── Static inventory provider ─────────────────────────────────────────────────

/// Fixed-inventory provider for statically configured worker fleets.
///
/// `create_node` always refuses; scale-out against a static fleet is an
/// operator action (edit the inventory, restart).
pub struct StaticNodeProvider {
    nodes: Mutex<Vec<NodeDescriptor>>,
}

impl StaticNodeProvider {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
        }
    }
}

#[async_trait]
impl NodeProvider for StaticNodeProvider {
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, ProviderError> {
        Ok(self.nodes.lock().expect("inventory lock poisoned").clone())
    }

    async fn create_node(&self, _spec: &NodeSpec) -> Result<NodeDescriptor, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn delete_node(&self, id: &str) -> Result<(), ProviderError> {
        let mut nodes = self.nodes.lock().expect("inventory lock poisoned");
        let before = nodes.len();
        nodes.retain(|n| n.id != id);
        if nodes.len() == before {
            return Err(ProviderError::Rejected(format!("unknown node id '{id}'")));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
