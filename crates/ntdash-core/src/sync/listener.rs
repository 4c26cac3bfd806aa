//! Key listener registry
//!
//! One typed callback per path. The callback's kind is part of its type,
//! so dispatch is a match on `(listener, value)`: a value of another kind
//! is simply not delivered.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::path;
use crate::value::{Value, ValueKind};

/// Shared callback
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A callback together with the value kind it accepts
#[derive(Clone)]
pub enum Listener {
    Bool(Callback<bool>),
    Double(Callback<f64>),
    String(Callback<String>),
    Raw(Callback<Vec<u8>>),
    DoubleArray(Callback<Vec<f64>>),
    StringArray(Callback<Vec<String>>),
    /// Receives every value, `Unassigned` included
    Value(Callback<Value>),
}

impl Listener {
    pub fn bool(f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Listener::Bool(Arc::new(f))
    }

    pub fn double(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Listener::Double(Arc::new(f))
    }

    pub fn string(f: impl Fn(String) + Send + Sync + 'static) -> Self {
        Listener::String(Arc::new(f))
    }

    pub fn raw(f: impl Fn(Vec<u8>) + Send + Sync + 'static) -> Self {
        Listener::Raw(Arc::new(f))
    }

    pub fn double_array(f: impl Fn(Vec<f64>) + Send + Sync + 'static) -> Self {
        Listener::DoubleArray(Arc::new(f))
    }

    pub fn string_array(f: impl Fn(Vec<String>) + Send + Sync + 'static) -> Self {
        Listener::StringArray(Arc::new(f))
    }

    pub fn value(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Listener::Value(Arc::new(f))
    }

    /// Kind this listener accepts; `None` accepts any
    pub fn expected_kind(&self) -> Option<ValueKind> {
        match self {
            Listener::Bool(_) => Some(ValueKind::Bool),
            Listener::Double(_) => Some(ValueKind::Double),
            Listener::String(_) => Some(ValueKind::String),
            Listener::Raw(_) => Some(ValueKind::Raw),
            Listener::DoubleArray(_) => Some(ValueKind::DoubleArray),
            Listener::StringArray(_) => Some(ValueKind::StringArray),
            Listener::Value(_) => None,
        }
    }

    /// Invoke the callback if `value` has the expected kind
    ///
    /// Returns whether the callback ran.
    pub fn call(&self, value: &Value) -> bool {
        match (self, value) {
            (Listener::Bool(f), Value::Bool(b)) => f(*b),
            (Listener::Double(f), Value::Double(d)) => f(*d),
            (Listener::String(f), Value::String(s)) => f(s.clone()),
            (Listener::Raw(f), Value::Raw(bytes)) => f(bytes.clone()),
            (Listener::DoubleArray(f), Value::DoubleArray(values)) => f(values.clone()),
            (Listener::StringArray(f), Value::StringArray(values)) => f(values.clone()),
            (Listener::Value(f), value) => f(value.clone()),
            _ => return false,
        }
        true
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected_kind() {
            Some(kind) => write!(f, "Listener({})", kind),
            None => f.write_str("Listener(any)"),
        }
    }
}

/// Path-keyed listener storage
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: HashMap<String, Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; the first registration for a path wins
    pub fn register(&mut self, path: &str, listener: Listener) -> bool {
        if self.entries.contains_key(path) {
            return false;
        }
        self.entries.insert(path.to_string(), listener);
        true
    }

    pub fn get(&self, path: &str) -> Option<Listener> {
        self.entries.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Tables owning at least one registered path
    pub fn tables(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .filter_map(|p| path::split_path(p).ok())
            .map(|(table, _)| table.to_string())
            .collect()
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
    use std::sync::Mutex;

    #[test]
    fn test_typed_call_matches_kind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = Listener::double(move |v| sink.lock().unwrap().push(v));

        assert!(listener.call(&Value::Double(1.5)));
        assert!(!listener.call(&Value::from("1.5")));
        assert!(!listener.call(&Value::Unassigned));

        assert_eq!(*seen.lock().unwrap(), vec![1.5]);
        assert_eq!(listener.expected_kind(), Some(ValueKind::Double));
    }

    #[test]
    fn test_value_listener_accepts_anything() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = Listener::value(move |v| sink.lock().unwrap().push(v));

        assert!(listener.call(&Value::Bool(true)));
        assert!(listener.call(&Value::Unassigned));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(listener.expected_kind(), None);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = ListenerRegistry::new();
        assert!(registry.register("SmartDashboard/Lift Distance", Listener::double(|_| {})));
        assert!(!registry.register("SmartDashboard/Lift Distance", Listener::string(|_| {})));

        let kept = registry.get("SmartDashboard/Lift Distance").unwrap();
        assert_eq!(kept.expected_kind(), Some(ValueKind::Double));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tables_are_deduplicated() {
        let mut registry = ListenerRegistry::new();
        registry.register("SmartDashboard/Left Speed (RPM)", Listener::double(|_| {}));
        registry.register("SmartDashboard/Right Speed (RPM)", Listener::double(|_| {}));
        registry.register("SmartDashboard/autonomous/auto_modes", Listener::string(|_| {}));

        let tables: Vec<String> = registry.tables().into_iter().collect();
        assert_eq!(tables, vec!["SmartDashboard", "SmartDashboard/autonomous"]);
        assert_eq!(registry.paths()[0], "SmartDashboard/Left Speed (RPM)");
    }
}
