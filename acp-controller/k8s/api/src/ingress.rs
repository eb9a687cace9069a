//! Decoding of routing resources (Ingresses) from admission payloads.
//!
//! Several API versions of the Ingress resource may reach the admission
//! webhook. Only the object metadata and the `spec.ingressClassName` field are
//! read, and both are laid out identically in every supported version, so all
//! versions decode into the same [`RoutingResource`].

use crate::{DynamicObject, GroupVersionKind};
use serde::Deserialize;
use std::collections::BTreeMap;

/// The legacy annotation used to select an ingress controller.
pub const CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Group/version pairs under which the `Ingress` kind is recognized.
const INGRESS_VERSIONS: [(&str, &str); 3] = [
    ("networking.k8s.io", "v1"),
    ("networking.k8s.io", "v1beta1"),
    ("extensions", "v1beta1"),
];

const INGRESS_KIND: &str = "Ingress";

/// An Ingress-like object under review.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingResource {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,

    /// The explicit `spec.ingressClassName` reference, if set.
    pub class_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid ingress spec: {0}")]
    Spec(#[from] serde_json::Error),

    #[error("ingress spec must be an object")]
    SpecNotObject,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecClass {
    #[serde(default)]
    ingress_class_name: Option<String>,
}

/// Indicates whether the given kind is one of the recognized Ingress
/// representations.
pub fn is_ingress(kind: &GroupVersionKind) -> bool {
    kind.kind == INGRESS_KIND
        && INGRESS_VERSIONS
            .iter()
            .any(|(group, version)| kind.group == *group && kind.version == *version)
}

// === impl RoutingResource ===

impl RoutingResource {
    /// Decodes a routing resource from an admission object.
    ///
    /// Objects submitted for creation may omit `metadata.namespace`, in which
    /// case `default_ns` (the request's namespace) is used.
    pub fn decode(obj: &DynamicObject, default_ns: Option<&str>) -> Result<Self, DecodeError> {
        let class_name = match obj.data.get("spec") {
            None | Some(serde_json::Value::Null) => None,
            Some(spec @ serde_json::Value::Object(_)) => {
                SpecClass::deserialize(spec)?.ingress_class_name
            }
            Some(_) => return Err(DecodeError::SpecNotObject),
        };

        let namespace = obj
            .metadata
            .namespace
            .clone()
            .or_else(|| default_ns.map(ToString::to_string))
            .unwrap_or_default();
        let name = obj
            .metadata
            .name
            .clone()
            .or_else(|| obj.metadata.generate_name.clone())
            .unwrap_or_default();

        Ok(Self {
            namespace,
            name,
            annotations: obj.metadata.annotations.clone().unwrap_or_default(),
            class_name: class_name.filter(|n| !n.is_empty()),
        })
    }

    /// Returns the legacy ingress class annotation, if set to a non-empty value.
    pub fn class_annotation(&self) -> Option<&str> {
        self.annotations
            .get(CLASS_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
