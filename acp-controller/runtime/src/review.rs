//! Reviews admission requests for routing resources bound to access control
//! policies.

use crate::{
    core::{
        binding, chain, BindingTransition, Error, GetPolicy, Ledger, MiddlewareStore, PolicyRef,
        Provisioner, ResolveClass, TRAEFIK_CONTROLLER,
    },
    k8s::{ingress, AccessControlPolicySpec, DynamicObject, RoutingResource},
};
use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use kube::core::admission::Operation;
use std::collections::BTreeMap;
use tracing::{debug, info};


pub type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;

/// The legacy class annotation value that designates Traefik without an
/// `IngressClass` resource.
const TRAEFIK_CLASS: &str = "traefik";

/// Binds routing resources to access control policies as they are admitted.
pub struct Reviewer<C, P, S> {
    classes: C,
    policies: P,
    provisioner: Provisioner<S>,
    ledger: Ledger,
    controller: String,
}

// === impl Reviewer ===

impl<C, P, S> Reviewer<C, P, S>
where
    C: ResolveClass,
    P: GetPolicy,
    S: MiddlewareStore,
{
    pub fn new(classes: C, policies: P, provisioner: Provisioner<S>, ledger: Ledger) -> Self {
        Self {
            classes,
            policies,
            provisioner,
            ledger,
            controller: TRAEFIK_CONTROLLER.to_string(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn provisioner(&self) -> &Provisioner<S> {
        &self.provisioner
    }

    /// Indicates whether the request targets a routing resource handled by
    /// the served controller. Must be checked before calling [`Self::review`].
    pub fn can_review(&self, req: &AdmissionRequest) -> Result<bool, Error> {
        if !ingress::is_ingress(&req.kind) {
            return Ok(false);
        }

        let Some(obj) = req.object.as_ref().or(req.old_object.as_ref()) else {
            return Err(Error::Decode("admission request carries no object".to_string()));
        };
        let resource = decode(obj, req.namespace.as_deref())?;
        classify(&self.classes, &resource, &self.controller)
    }

    /// Reviews a routing resource, reserving quota for and provisioning the
    /// middleware of a newly bound policy.
    ///
    /// Returns a patch replacing the resource's annotations when its
    /// middleware chain must change. No patch is returned when the review
    /// fails.
    ///
    /// Dry-run requests are validated and patched without reserving quota or
    /// writing middlewares.
    ///
    /// Quota reserved by a review is committed or rolled back before this
    /// future completes. Callers that abandon the future early (e.g. on a
    /// timeout) leave the reservation in place.
    pub async fn review(&self, req: &AdmissionRequest) -> Result<Option<Patch>, Error> {
        let ns = req.namespace.as_deref();
        let prior = req.old_object.as_ref().map(|o| decode(o, ns)).transpose()?;
        let desired = match req.operation {
            Operation::Delete => None,
            _ => req.object.as_ref().map(|o| decode(o, ns)).transpose()?,
        };

        let Some(subject) = desired.as_ref().or(prior.as_ref()) else {
            return Ok(None);
        };

        let transition = binding::diff(prior.as_ref(), desired.as_ref())?;
        debug!(?transition);

        if req.dry_run {
            if let BindingTransition::Bind(new) | BindingTransition::Rebind { new, .. } =
                &transition
            {
                self.policy(new)?;
            }
            debug!("Dry run; skipped quota and middleware changes");
        } else {
            match &transition {
                BindingTransition::NoChange(_) => {}
                BindingTransition::Bind(new) => self.bind(subject, new).await?,
                BindingTransition::Unbind(old) => self.unbind(subject, old),
                BindingTransition::Rebind { old, new } => {
                    // The old binding is gone regardless of whether the new
                    // one can be admitted.
                    self.unbind(subject, old);
                    self.bind(subject, new).await?;
                }
            }
        }

        let Some(desired) = desired else {
            return Ok(None);
        };
        let annotations = chain::rewrite(&desired.annotations, &desired.namespace, &transition);
        if annotations == desired.annotations {
            return Ok(None);
        }
        Ok(Some(replace_annotations(annotations)))
    }

    async fn bind(&self, subject: &RoutingResource, policy: &PolicyRef) -> Result<(), Error> {
        let id = binding::binding_id(subject, policy);
        let tx = self.ledger.reserve(&id, 1)?;

        match self.provision(&subject.namespace, policy).await {
            Ok(()) => {
                tx.commit();
                info!(%policy, "Bound access control policy");
                Ok(())
            }
            Err(error) => {
                tx.rollback();
                Err(error)
            }
        }
    }

    fn unbind(&self, subject: &RoutingResource, policy: &PolicyRef) {
        let id = binding::binding_id(subject, policy);
        self.ledger.release(&id, 1).commit();
        info!(%policy, "Unbound access control policy");
    }

    async fn provision(&self, ns: &str, policy: &PolicyRef) -> Result<(), Error> {
        let config = self.policy(policy)?;
        let mref = self.provisioner.provision(ns, policy, &config).await?;
        debug!(middleware = %mref.chain_entry());
        Ok(())
    }

    fn policy(&self, policy: &PolicyRef) -> Result<AccessControlPolicySpec, Error> {
        self.policies
            .get_policy(policy)
            .map_err(|error| Error::PolicyLookup {
                policy: policy.clone(),
                error,
            })?
            .ok_or_else(|| Error::PolicyNotFound(policy.clone()))
    }
}

/// Indicates whether a routing resource is handled by `controller`.
///
/// An explicit class reference takes precedence over the legacy class
/// annotation. Resources that set neither are handled by the cluster's
/// default class.
pub fn classify<C: ResolveClass>(
    classes: &C,
    resource: &RoutingResource,
    controller: &str,
) -> Result<bool, Error> {
    let resolved = if let Some(name) = resource.class_name.as_deref() {
        classes.controller(name)
    } else if let Some(annotation) = resource.class_annotation() {
        if annotation == TRAEFIK_CLASS {
            return Ok(true);
        }
        classes.controller(annotation)
    } else {
        classes
            .default_controller()
            .map_err(Error::ClassResolution)?
    };

    Ok(resolved.as_deref() == Some(controller))
}

fn decode(obj: &DynamicObject, ns: Option<&str>) -> Result<RoutingResource, Error> {
    RoutingResource::decode(obj, ns).map_err(|error| Error::Decode(error.to_string()))
}

fn replace_annotations(annotations: BTreeMap<String, String>) -> Patch {
    let value = annotations
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect::<serde_json::Map<_, _>>();

    Patch(vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(["metadata", "annotations"]),
        value: serde_json::Value::Object(value),
    })])
}
