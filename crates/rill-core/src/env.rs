use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::value::Value;

/// A lexical scope for the tree-walking evaluator: a mutable binding map
/// plus an optional enclosing scope.
#[derive(Debug, Default)]
pub struct Environment {
    store: RefCell<HashMap<String, Value>>,
    outer: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Rc<Environment> {
        Rc::new(Environment::default())
    }

    /// A child scope; lookups fall through to `outer` on miss.
    pub fn new_enclosed(outer: Rc<Environment>) -> Rc<Environment> {
        Rc::new(Environment {
            store: RefCell::new(HashMap::new()),
            outer: Some(outer),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.store.borrow().get(name) {
            return Some(value.clone());
        }
        self.outer.as_ref()?.get(name)
    }

    /// Bind `name` in this scope, shadowing any outer binding.
    pub fn set(&self, name: &str, value: Value) {
        self.store.borrow_mut().insert(name.to_string(), value);
    }

    /// Overwrite an existing binding wherever it lives in the chain.
    /// Returns false when the name is not bound anywhere.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        if self.store.borrow().contains_key(name) {
            self.store.borrow_mut().insert(name.to_string(), value);
            return true;
        }
        match &self.outer {
            Some(outer) => outer.assign(name, value),
            None => false,
        }
    }
}
