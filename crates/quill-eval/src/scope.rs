//! Namespaces and local frames.

use std::sync::Arc;

use quill_core::Value;

/// Ordered string-keyed variable scope. Backs both template namespaces and
/// the local frame of a macro/function invocation. Writes overwrite in place
/// so iteration order is first-write order.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Vec<(Arc<str>, Value)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, name: impl Into<Arc<str>>, value: Value) {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            existing.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Remove a binding, returning the previous value. Used by scoped
    /// bindings (loop variables, lambda parameters) to restore the outer
    /// state on exit.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k.as_ref() == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_in_place_keeping_order() {
        let mut ns = Namespace::new();
        ns.set("a", Value::int(1));
        ns.set("b", Value::int(2));
        ns.set("a", Value::int(3));
        assert_eq!(ns.get("a"), Some(&Value::int(3)));
        let names: Vec<&str> = ns.names().map(|n| n.as_ref()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn remove_returns_the_old_binding() {
        let mut ns = Namespace::new();
        ns.set("x", Value::int(1));
        assert_eq!(ns.remove("x"), Some(Value::int(1)));
        assert_eq!(ns.remove("x"), None);
        assert!(ns.is_empty());
    }
}
