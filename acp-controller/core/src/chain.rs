use crate::{middleware::MiddlewareRef, BindingTransition, MIDDLEWARES_ANNOTATION};
use std::collections::BTreeMap;

/// The ordered router middlewares of a routing resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MiddlewareChain(Vec<String>);

/// Rewrites a routing resource's annotations so that its middleware chain
/// reflects `transition`.
///
/// The released policy's entry is dropped and the bound policy's entry is
/// moved (or added) to the tail of the chain. All other entries keep their
/// relative order, and all other annotations are returned untouched.
pub fn rewrite(
    annotations: &BTreeMap<String, String>,
    ingress_ns: &str,
    transition: &BindingTransition,
) -> BTreeMap<String, String> {
    let mut chain =
        MiddlewareChain::parse(annotations.get(MIDDLEWARES_ANNOTATION).map(String::as_str));

    if let Some(old) = transition.released() {
        chain.remove(MiddlewareRef::new(ingress_ns, old).chain_entry());
    }
    if let Some(new) = transition.bound() {
        let entry = MiddlewareRef::new(ingress_ns, new);
        chain.remove(entry.chain_entry());
        chain.push(entry.chain_entry());
    }

    let mut annotations = annotations.clone();
    match chain.render() {
        Some(value) => {
            // Leave an untouched chain byte-for-byte as the user wrote it.
            let changed = annotations
                .get(MIDDLEWARES_ANNOTATION)
                .map(|current| MiddlewareChain::parse(Some(current)) != chain)
                .unwrap_or(true);
            if changed {
                annotations.insert(MIDDLEWARES_ANNOTATION.to_string(), value);
            }
        }
        None => {
            if annotations
                .get(MIDDLEWARES_ANNOTATION)
                .is_some_and(|current| !current.trim().is_empty())
            {
                annotations.remove(MIDDLEWARES_ANNOTATION);
            }
        }
    }
    annotations
}

// === impl MiddlewareChain ===

impl MiddlewareChain {
    pub fn parse(value: Option<&str>) -> Self {
        let entries = value
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(ToString::to_string)
            .collect();
        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn remove(&mut self, entry: &str) {
        self.0.retain(|e| e != entry);
    }

    pub fn push(&mut self, entry: &str) {
        self.0.push(entry.to_string());
    }

    /// Renders the annotation value, or `None` when the chain is empty.
    pub fn render(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(self.0.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PolicyRef, POLICY_ANNOTATION};
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn policy(name: &str) -> PolicyRef {
        PolicyRef::new(name, "test")
    }

    #[test]
    fn parses_and_renders() {
        let chain = MiddlewareChain::parse(Some(" a@kubernetescrd, ,b@file ,"));
        assert_eq!(chain.entries(), ["a@kubernetescrd", "b@file"]);
        assert_eq!(chain.render().as_deref(), Some("a@kubernetescrd,b@file"));

        assert_eq!(MiddlewareChain::parse(None).render(), None);
        assert_eq!(MiddlewareChain::parse(Some("")).render(), None);
    }

    #[test]
    fn bind_appends_after_existing_entries() {
        let annotations = btreemap! {
            POLICY_ANNOTATION.to_string() => "my-policy@test".to_string(),
            "custom-annotation".to_string() => "foobar".to_string(),
            MIDDLEWARES_ANNOTATION.to_string() => "custom@kubernetescrd".to_string(),
        };

        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::Bind(policy("my-policy")),
        );
        assert_eq!(
            rewritten,
            btreemap! {
                POLICY_ANNOTATION.to_string() => "my-policy@test".to_string(),
                "custom-annotation".to_string() => "foobar".to_string(),
                MIDDLEWARES_ANNOTATION.to_string() =>
                    "custom@kubernetescrd,test-zz-my-policy-test@kubernetescrd".to_string(),
            }
        );
    }

    #[test]
    fn bind_without_chain_adds_annotation() {
        let rewritten = rewrite(
            &BTreeMap::new(),
            "apps",
            &BindingTransition::Bind(policy("my-policy")),
        );
        assert_eq!(
            rewritten,
            btreemap! {
                MIDDLEWARES_ANNOTATION.to_string() =>
                    "apps-zz-my-policy-test@kubernetescrd".to_string(),
            }
        );
    }

    #[test]
    fn rebind_replaces_entry() {
        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() =>
                "a@kubernetescrd,test-zz-my-old-policy-test@kubernetescrd,b@kubernetescrd".to_string(),
        };

        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::Rebind {
                old: policy("my-old-policy"),
                new: policy("my-policy"),
            },
        );
        assert_eq!(
            rewritten[MIDDLEWARES_ANNOTATION],
            "a@kubernetescrd,b@kubernetescrd,test-zz-my-policy-test@kubernetescrd"
        );
    }

    #[test]
    fn unbind_removes_entry() {
        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() =>
                "a@kubernetescrd,test-zz-my-policy-test@kubernetescrd".to_string(),
        };
        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::Unbind(policy("my-policy")),
        );
        assert_eq!(rewritten[MIDDLEWARES_ANNOTATION], "a@kubernetescrd");

        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() =>
                "test-zz-my-policy-test@kubernetescrd".to_string(),
            "other".to_string() => "value".to_string(),
        };
        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::Unbind(policy("my-policy")),
        );
        assert_eq!(rewritten, btreemap! { "other".to_string() => "value".to_string() });
    }

    #[test]
    fn unchanged_binding_restores_tail_entry() {
        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() =>
                "test-zz-my-policy-test@kubernetescrd,a@kubernetescrd".to_string(),
        };
        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::NoChange(Some(policy("my-policy"))),
        );
        assert_eq!(
            rewritten[MIDDLEWARES_ANNOTATION],
            "a@kubernetescrd,test-zz-my-policy-test@kubernetescrd"
        );
    }

    #[test]
    fn untouched_chain_keeps_formatting() {
        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() =>
                "a@kubernetescrd, test-zz-my-policy-test@kubernetescrd".to_string(),
        };
        let rewritten = rewrite(
            &annotations,
            "test",
            &BindingTransition::NoChange(Some(policy("my-policy"))),
        );
        assert_eq!(rewritten, annotations);

        let annotations = btreemap! {
            MIDDLEWARES_ANNOTATION.to_string() => String::new(),
        };
        let rewritten = rewrite(&annotations, "test", &BindingTransition::NoChange(None));
        assert_eq!(rewritten, annotations);
    }
}
