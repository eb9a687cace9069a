use crate::{
    core::{GetPolicy, PolicyRef},
    k8s::{AccessControlPolicy, AccessControlPolicySpec, ResourceExt},
};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A shared index of `AccessControlPolicy` configurations, keyed by
/// namespace and name.
#[derive(Clone, Debug, Default)]
pub struct Policies(Arc<RwLock<Index>>);

#[derive(Debug, Default)]
pub(crate) struct Index {
    by_ns: HashMap<String, HashMap<String, AccessControlPolicySpec>>,
}

// === impl Policies ===

impl Policies {
    /// The index updated by the `AccessControlPolicy` watch.
    pub(crate) fn index(&self) -> Arc<RwLock<Index>> {
        self.0.clone()
    }
}

impl GetPolicy for Policies {
    fn get_policy(&self, policy: &PolicyRef) -> anyhow::Result<Option<AccessControlPolicySpec>> {
        Ok(self
            .0
            .read()
            .by_ns
            .get(&policy.namespace)
            .and_then(|policies| policies.get(&policy.name))
            .cloned())
    }
}

// === impl Index ===

impl kubert::index::IndexNamespacedResource<AccessControlPolicy> for Index {
    fn apply(&mut self, policy: AccessControlPolicy) {
        let Some(ns) = policy.namespace() else {
            tracing::warn!(name = %policy.name_any(), "Ignoring policy without a namespace");
            return;
        };
        let name = policy.name_unchecked();
        tracing::debug!(%ns, %name, "Indexed access control policy");
        self.by_ns.entry(ns).or_default().insert(name, policy.spec);
    }

    fn delete(&mut self, namespace: String, name: String) {
        if let Some(policies) = self.by_ns.get_mut(&namespace) {
            policies.remove(&name);
            if policies.is_empty() {
                self.by_ns.remove(&namespace);
            }
        }
    }
}
