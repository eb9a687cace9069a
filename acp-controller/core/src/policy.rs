use crate::PolicyRef;
use acp_controller_k8s_api::policy::{
    AccessControlPolicySpec, BasicAuthConfig, DigestAuthConfig, JwtConfig,
};
use std::sync::Arc;

/// Looks up access control policy configurations.
pub trait GetPolicy {
    /// Returns the policy's configuration, or `None` if no such policy exists.
    fn get_policy(&self, policy: &PolicyRef) -> anyhow::Result<Option<AccessControlPolicySpec>>;
}

impl<T: GetPolicy + ?Sized> GetPolicy for Arc<T> {
    fn get_policy(&self, policy: &PolicyRef) -> anyhow::Result<Option<AccessControlPolicySpec>> {
        (**self).get_policy(policy)
    }
}

/// The authentication method a policy configures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthKind {
    Jwt(JwtConfig),
    BasicAuth(BasicAuthConfig),
    DigestAuth(DigestAuthConfig),
}

// === impl AuthKind ===

impl AuthKind {
    /// Selects the authentication method configured by a policy.
    ///
    /// Returns `None` when the policy configures no supported method.
    pub fn from_spec(spec: &AccessControlPolicySpec) -> Option<Self> {
        if let Some(jwt) = &spec.jwt {
            return Some(Self::Jwt(jwt.clone()));
        }
        if let Some(basic) = &spec.basic_auth {
            return Some(Self::BasicAuth(basic.clone()));
        }
        if let Some(digest) = &spec.digest_auth {
            return Some(Self::DigestAuth(digest.clone()));
        }
        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jwt(_) => "jwt",
            Self::BasicAuth(_) => "basicAuth",
            Self::DigestAuth(_) => "digestAuth",
        }
    }
}
