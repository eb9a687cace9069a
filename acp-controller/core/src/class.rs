use std::sync::Arc;

/// Resolves ingress class names to the controller type that implements them.
pub trait ResolveClass {
    /// Returns the controller of the named class, or `None` if the class is
    /// not known.
    fn controller(&self, class_name: &str) -> Option<String>;

    /// Returns the controller of the cluster's default class, if one is
    /// configured.
    fn default_controller(&self) -> anyhow::Result<Option<String>>;
}

impl<T: ResolveClass + ?Sized> ResolveClass for Arc<T> {
    fn controller(&self, class_name: &str) -> Option<String> {
        (**self).controller(class_name)
    }

    fn default_controller(&self) -> anyhow::Result<Option<String>> {
        (**self).default_controller()
    }
}
