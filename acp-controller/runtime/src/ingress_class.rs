use crate::{
    core::ResolveClass,
    k8s::{IngressClass, ResourceExt},
};
use ahash::AHashMap as HashMap;
use anyhow::bail;
use parking_lot::RwLock;
use std::sync::Arc;

/// Marks the class that applies to routing resources that do not name one.
const DEFAULT_CLASS_ANNOTATION: &str = "ingressclass.kubernetes.io/is-default-class";

/// A shared index of the cluster's `IngressClass` resources.
#[derive(Clone, Debug, Default)]
pub struct IngressClasses(Arc<RwLock<Index>>);

#[derive(Debug, Default)]
pub(crate) struct Index {
    by_name: HashMap<String, Class>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Class {
    controller: Option<String>,
    is_default: bool,
}

// === impl IngressClasses ===

impl IngressClasses {
    pub fn from_list(classes: impl IntoIterator<Item = IngressClass>) -> Self {
        let mut index = Index::default();
        for class in classes {
            index.insert(class);
        }
        Self(Arc::new(RwLock::new(index)))
    }

    /// The index updated by the `IngressClass` watch.
    pub(crate) fn index(&self) -> Arc<RwLock<Index>> {
        self.0.clone()
    }
}

impl ResolveClass for IngressClasses {
    fn controller(&self, class_name: &str) -> Option<String> {
        self.0
            .read()
            .by_name
            .get(class_name)
            .and_then(|c| c.controller.clone())
    }

    fn default_controller(&self) -> anyhow::Result<Option<String>> {
        let index = self.0.read();
        let mut defaults = index
            .by_name
            .iter()
            .filter(|(_, class)| class.is_default);

        let Some((_, class)) = defaults.next() else {
            return Ok(None);
        };
        if defaults.next().is_some() {
            let mut names = index
                .by_name
                .iter()
                .filter(|(_, c)| c.is_default)
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>();
            names.sort_unstable();
            bail!("multiple default ingress classes: {}", names.join(", "));
        }
        Ok(class.controller.clone())
    }
}

// === impl Index ===

impl Index {
    fn insert(&mut self, class: IngressClass) {
        let is_default = class
            .annotations()
            .get(DEFAULT_CLASS_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let controller = class.spec.and_then(|spec| spec.controller);
        let name = class.metadata.name.unwrap_or_default();
        tracing::debug!(%name, ?controller, is_default, "Indexed ingress class");
        self.by_name.insert(
            name,
            Class {
                controller,
                is_default,
            },
        );
    }
}

impl kubert::index::IndexClusterResource<IngressClass> for Index {
    fn apply(&mut self, class: IngressClass) {
        self.insert(class);
    }

    fn delete(&mut self, name: String) {
        self.by_name.remove(&name);
    }
}
