//! Derives policy-binding transitions from the prior and desired states of a
//! routing resource.

use crate::POLICY_ANNOTATION;
use acp_controller_k8s_api::RoutingResource;
use std::fmt;
use tracing::warn;

/// References an access control policy by its canonical name,
/// `name@namespace`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid access control policy reference {0:?}: expected name@namespace")]
pub struct InvalidPolicyRef(String);

/// The change a review applies to a routing resource's policy binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingTransition {
    /// Both sides resolve to the same binding, which may be absent.
    NoChange(Option<PolicyRef>),
    Bind(PolicyRef),
    Rebind { old: PolicyRef, new: PolicyRef },
    Unbind(PolicyRef),
}

/// Computes the binding transition between two states of a routing resource.
///
/// An absent prior state denotes creation; an absent desired state denotes
/// deletion. Only the desired state's reference must be valid: a prior
/// reference that does not parse never held quota and is treated as no
/// binding.
pub fn diff(
    prior: Option<&RoutingResource>,
    desired: Option<&RoutingResource>,
) -> Result<BindingTransition, InvalidPolicyRef> {
    let old = prior.and_then(|prior| match current(prior) {
        Ok(policy) => policy,
        Err(error) => {
            warn!(ns = %prior.namespace, name = %prior.name, %error, "Ignoring prior policy binding");
            None
        }
    });
    let new = desired.map(current).transpose()?.flatten();

    let transition = match (old, new) {
        (None, None) => BindingTransition::NoChange(None),
        (None, Some(new)) => BindingTransition::Bind(new),
        (Some(old), None) => BindingTransition::Unbind(old),
        (Some(old), Some(new)) if old == new => BindingTransition::NoChange(Some(new)),
        (Some(old), Some(new)) => BindingTransition::Rebind { old, new },
    };
    Ok(transition)
}

/// Reads the policy a routing resource is bound to.
pub fn current(resource: &RoutingResource) -> Result<Option<PolicyRef>, InvalidPolicyRef> {
    match resource.annotations.get(POLICY_ANNOTATION) {
        Some(value) => PolicyRef::parse(value, &resource.namespace),
        None => Ok(None),
    }
}

/// Identifies a binding of a routing resource to a policy in the quota ledger.
pub fn binding_id(resource: &RoutingResource, policy: &PolicyRef) -> String {
    format!("{}/{}/{}", resource.namespace, resource.name, policy)
}

// === impl BindingTransition ===

impl BindingTransition {
    /// The binding that no longer applies after this transition.
    pub fn released(&self) -> Option<&PolicyRef> {
        match self {
            Self::Unbind(old) | Self::Rebind { old, .. } => Some(old),
            Self::NoChange(_) | Self::Bind(_) => None,
        }
    }

    /// The binding in effect after this transition.
    pub fn bound(&self) -> Option<&PolicyRef> {
        match self {
            Self::NoChange(policy) => policy.as_ref(),
            Self::Bind(new) | Self::Rebind { new, .. } => Some(new),
            Self::Unbind(_) => None,
        }
    }
}

// === impl PolicyRef ===

impl PolicyRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Parses a policy-binding annotation value.
    ///
    /// Blank values are treated as no binding. A value without a namespace
    /// refers to a policy in `default_ns`.
    pub fn parse(value: &str, default_ns: &str) -> Result<Option<Self>, InvalidPolicyRef> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let (name, namespace) = match value.split_once('@') {
            Some((name, ns)) => (name, ns),
            None => (value, default_ns),
        };
        if name.is_empty() || namespace.is_empty() || namespace.contains('@') {
            return Err(InvalidPolicyRef(value.to_string()));
        }

        Ok(Some(Self::new(name, namespace)))
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.namespace)
    }
}
