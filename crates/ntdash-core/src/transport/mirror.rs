//! Local mirror of remote entries
//!
//! Both transports keep a flat `path -> value` map of everything the
//! server has sent and expose it as a tree of [`Table`] handles. Listeners
//! are keyed by table path and only see that table's immediate keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::path::{self, SEPARATOR};
use crate::protocol::{ChangeFlags, Table, TableListener};
use crate::value::Value;

/// Sends local writes to the server
pub(crate) trait Upstream: Send + Sync {
    fn is_connected(&self) -> bool;
    fn send_put(&self, path: &str, value: Value) -> bool;
    fn send_delete(&self, path: &str) -> bool;
}

/// Flat entry map plus per-table listeners
#[derive(Default)]
pub(crate) struct Mirror {
    entries: RwLock<BTreeMap<String, Value>>,
    listeners: Mutex<HashMap<String, Vec<TableListener>>>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Value {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path::normalize_table(path))
            .cloned()
            .unwrap_or_default()
    }

    /// Store a value; listeners fire only if it actually changed
    ///
    /// `/SmartDashboard/x` and `SmartDashboard/x` name the same entry.
    pub fn apply(&self, path: &str, value: Value, is_local: bool) -> bool {
        let path = path::normalize_table(path);
        if !value.is_assigned() {
            return self.remove(path, is_local);
        }

        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), value.clone());

        if previous.as_ref() == Some(&value) {
            return false;
        }

        let flags = ChangeFlags {
            is_new: previous.is_none(),
            is_local,
            is_delete: false,
        };
        self.notify(path, &value, flags);
        true
    }

    pub fn remove(&self, path: &str, is_local: bool) -> bool {
        let path = path::normalize_table(path);
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);

        if removed.is_none() {
            return false;
        }

        let flags = ChangeFlags {
            is_new: false,
            is_local,
            is_delete: true,
        };
        self.notify(path, &Value::Unassigned, flags);
        true
    }

    /// Replace everything with a server snapshot
    pub fn replace_all(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let incoming: BTreeMap<String, Value> = entries
            .into_iter()
            .map(|(path, value)| (path::normalize_table(&path).to_string(), value))
            .collect();

        let stale: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|path| !incoming.contains_key(*path))
            .cloned()
            .collect();

        for path in stale {
            self.remove(&path, false);
        }
        for (path, value) in incoming {
            self.apply(&path, value, false);
        }
    }

    pub fn add_listener(&self, table: &str, listener: TableListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default()
            .push(listener);
    }

    pub fn clear_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn keys(&self, table: &str) -> BTreeSet<String> {
        self.children(table)
            .filter(|rest| !rest.contains(SEPARATOR))
            .collect()
    }

    pub fn sub_tables(&self, table: &str) -> BTreeSet<String> {
        self.children(table)
            .filter_map(|rest| rest.split_once(SEPARATOR).map(|(name, _)| name.to_string()))
            .collect()
    }

    /// Paths below `table`, relative to it
    fn children(&self, table: &str) -> impl Iterator<Item = String> {
        let prefix = format!("{}{}", table, SEPARATOR);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let children: Vec<String> = entries
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
            .collect();
        children.into_iter()
    }

    fn notify(&self, path: &str, value: &Value, flags: ChangeFlags) {
        let Ok((table, key)) = path::split_path(path) else {
            return;
        };

        // Listeners run without the lock held so they may call back in
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            listener(table, key, value, flags);
        }
    }
}

/// A [`Table`] view over a [`Mirror`]
pub(crate) struct MirrorTable {
    path: String,
    mirror: Arc<Mirror>,
    upstream: Arc<dyn Upstream>,
}

impl MirrorTable {
    pub fn new(path: &str, mirror: Arc<Mirror>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            path: path::normalize_table(path).to_string(),
            mirror,
            upstream,
        }
    }
}

impl Table for MirrorTable {
    fn path(&self) -> &str {
        &self.path
    }

    fn sub_table(&self, name: &str) -> Arc<dyn Table> {
        Arc::new(MirrorTable::new(
            &path::join(&self.path, name),
            self.mirror.clone(),
            self.upstream.clone(),
        ))
    }

    fn get_value(&self, key: &str) -> Value {
        self.mirror.get(&path::join(&self.path, key))
    }

    fn put_value(&self, key: &str, value: Value) -> bool {
        if !self.upstream.is_connected() {
            return false;
        }

        let full_path = path::join(&self.path, key);
        if value.is_assigned() {
            self.mirror.apply(&full_path, value.clone(), true);
            self.upstream.send_put(&full_path, value)
        } else {
            self.mirror.remove(&full_path, true);
            self.upstream.send_delete(&full_path)
        }
    }

    fn keys(&self) -> BTreeSet<String> {
        self.mirror.keys(&self.path)
    }

    fn sub_tables(&self) -> BTreeSet<String> {
        self.mirror.sub_tables(&self.path)
    }

    fn add_listener(&self, listener: TableListener) {
        self.mirror.add_listener(&self.path, listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Offline;

    impl Upstream for Offline {
        fn is_connected(&self) -> bool {
            false
        }
        fn send_put(&self, _path: &str, _value: Value) -> bool {
            false
        }
        fn send_delete(&self, _path: &str) -> bool {
            false
        }
    }

    fn seeded() -> Arc<Mirror> {
        let mirror = Arc::new(Mirror::new());
        mirror.apply("SmartDashboard/Lift Distance", Value::Double(2.0), false);
        mirror.apply("SmartDashboard/autonomous/auto_modes", Value::from("{}"), false);
        mirror.apply("SmartDashboard/Warnings/AddQueue", Value::StringArray(vec![]), false);
        mirror
    }

    #[test]
    fn test_keys_and_sub_tables() {
        let mirror = seeded();

        let keys = mirror.keys("SmartDashboard");
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["Lift Distance"]);

        let tables = mirror.sub_tables("SmartDashboard");
        assert_eq!(
            tables.into_iter().collect::<Vec<_>>(),
            vec!["Warnings", "autonomous"]
        );
    }

    #[test]
    fn test_listener_sees_only_changes_of_its_table() {
        let mirror = seeded();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        mirror.add_listener(
            "SmartDashboard",
            Arc::new(move |table, key, value, flags| {
                assert_eq!(table, "SmartDashboard");
                assert_eq!(key, "Lift Distance");
                assert_eq!(value, &Value::Double(3.0));
                assert!(!flags.is_new);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        mirror.apply("SmartDashboard/Lift Distance", Value::Double(3.0), false);
        // Same value again is not a change
        mirror.apply("SmartDashboard/Lift Distance", Value::Double(3.0), false);
        mirror.apply("SmartDashboard/autonomous/auto_modes", Value::from("[]"), false);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_all_deletes_missing_entries() {
        let mirror = seeded();
        mirror.replace_all(vec![(
            "SmartDashboard/Lift Distance".to_string(),
            Value::Double(1.0),
        )]);

        assert_eq!(mirror.get("SmartDashboard/Lift Distance"), Value::Double(1.0));
        assert_eq!(
            mirror.get("SmartDashboard/autonomous/auto_modes"),
            Value::Unassigned
        );
    }

    #[test]
    fn test_table_put_requires_connection() {
        let mirror = seeded();
        let table = MirrorTable::new("SmartDashboard", mirror.clone(), Arc::new(Offline));

        assert!(!table.put_value("Lift Distance", Value::Double(9.0)));
        assert_eq!(table.get_value("Lift Distance"), Value::Double(2.0));
        assert_eq!(table.sub_table("autonomous").path(), "SmartDashboard/autonomous");
    }

    #[test]
    fn test_leading_separator_names_the_same_entry() {
        let mirror = Arc::new(Mirror::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        mirror.add_listener(
            "SmartDashboard",
            Arc::new(move |_table, key, value, _flags| {
                log.lock().unwrap().push((key.to_string(), value.clone()));
            }),
        );

        mirror.apply("/SmartDashboard/Lift Distance", Value::Double(2.0), false);
        assert_eq!(mirror.get("SmartDashboard/Lift Distance"), Value::Double(2.0));
        assert_eq!(mirror.get("/SmartDashboard/Lift Distance/"), Value::Double(2.0));
        assert_eq!(
            mirror.keys("SmartDashboard").into_iter().collect::<Vec<_>>(),
            vec!["Lift Distance"]
        );

        // Same entry, same value: no second notification
        mirror.apply("SmartDashboard/Lift Distance", Value::Double(2.0), false);
        assert_eq!(seen.lock().unwrap().len(), 1);

        mirror.replace_all(vec![("/SmartDashboard/time_running".to_string(), Value::Bool(true))]);
        assert_eq!(mirror.get("SmartDashboard/Lift Distance"), Value::Unassigned);
        assert_eq!(mirror.get("SmartDashboard/time_running"), Value::Bool(true));

        assert!(mirror.remove("/SmartDashboard/time_running", false));
        assert_eq!(mirror.get("SmartDashboard/time_running"), Value::Unassigned);
    }
}
