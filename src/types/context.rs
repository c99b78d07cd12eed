use std::collections::HashMap;

use super::Value;

/// Insertion-ordered name → value map. Writing an existing name overwrites it
/// in place, so iteration order is the order names were first written.
#[derive(Debug, Clone, Default, PartialEq)]
struct OrderedVars {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl OrderedVars {
    fn insert(&mut self, name: &str, value: Value) {
        match self.index.get(name) {
            Some(&idx) => self.entries[idx].1 = value,
            None => {
                self.index.insert(name.to_owned(), self.entries.len());
                self.entries.push((name.to_owned(), value));
            }
        }
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Input facts supplied by the caller (or an enrichment step) before a run.
///
/// # Example
///
/// ```
/// use rulechain::{Facts, Value};
///
/// let facts = Facts::new().set("age", 16_i64).set("income", 30_000_i64);
/// assert_eq!(facts.get("age"), Some(&Value::Int(16)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facts {
    vars: OrderedVars,
}

impl Facts {
    /// Create an empty fact set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fact, overwriting any previous value under the same name.
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a fact (mutable reference version).
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.vars.insert(name, value.into());
    }

    /// Merge another fact set into this one. Later values win.
    #[must_use]
    pub fn merge(mut self, other: &Facts) -> Self {
        for (name, value) in other.iter() {
            self.vars.insert(name, value.clone());
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Facts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.len() == 0
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Facts {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut facts = Facts::new();
        for (k, v) in iter {
            facts.insert(k.as_ref(), v);
        }
        facts
    }
}

/// The per-run variable store: the input facts plus every stage and
/// accumulator output written during the run.
///
/// Exclusively owned by one chain run. Parallel sibling rules read it through
/// a shared reference; their writes are merged back by the executor afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    vars: OrderedVars,
    outputs: Vec<String>,
}

impl ExecutionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded from input facts.
    #[must_use]
    pub fn seeded(facts: &Facts) -> Self {
        let mut ctx = Self::new();
        for (name, value) in facts.iter() {
            ctx.vars.insert(name, value.clone());
        }
        ctx
    }

    /// Look up a variable. Returns `None` if the name was never written.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Look up a variable, reading unset names as [`Value::Null`].
    #[must_use]
    pub fn value_of(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.get(name).is_some()
    }

    /// Write a variable, overwriting any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.vars.insert(name, value.into());
    }

    /// Write a variable and mark it as a named stage result.
    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) {
        self.vars.insert(name, value.into());
        if !self.outputs.iter().any(|o| o == name) {
            self.outputs.push(name.to_owned());
        }
    }

    /// The entries marked as stage results, in the order they were first marked.
    #[must_use]
    pub fn stage_results(&self) -> Vec<(String, Value)> {
        self.outputs
            .iter()
            .map(|name| (name.clone(), self.value_of(name)))
            .collect()
    }

    /// All variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.len() == 0
    }
}
