use std::collections::HashMap;

use crate::method::Method;

/// Immutable name → method mapping, built once at server start.
#[derive(Debug, Clone)]
pub struct Router {
    methods: HashMap<String, Method>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder {
            methods: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Collects method declarations into a [`Router`].
#[derive(Debug, Default)]
pub struct RouterBuilder {
    methods: HashMap<String, Method>,
}

impl RouterBuilder {
    /// Register a method. Re-registering a name replaces the earlier entry.
    pub fn method(mut self, name: &str, method: Method) -> Self {
        self.methods.insert(name.to_string(), method);
        self
    }

    pub fn build(self) -> Router {
        Router {
            methods: self.methods,
        }
    }
}
