//! Event admission
//!
//! Decides which watch events for the configuration kind are allowed into
//! the controller's reconcile queue.

/// Admission strategy with one decision per event category.
pub trait EventPredicate {
    fn create(&self, name: &str) -> bool;

    fn delete(&self, name: &str) -> bool;

    /// Updates are judged on the new object only.
    fn update(&self, old_name: &str, new_name: &str) -> bool;

    fn generic(&self, name: &str) -> bool;
}

/// Admits events for exactly one resource name, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceNameFilter {
    target: String,
}

impl InstanceNameFilter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn matches(&self, observed: &str) -> bool {
        observed == self.target
    }
}

impl EventPredicate for InstanceNameFilter {
    fn create(&self, name: &str) -> bool {
        self.matches(name)
    }

    fn delete(&self, name: &str) -> bool {
        self.matches(name)
    }

    fn update(&self, _old_name: &str, new_name: &str) -> bool {
        self.matches(new_name)
    }

    fn generic(&self, name: &str) -> bool {
        self.matches(name)
    }
}
