//! Master caution
//!
//! [`Cautioner`] holds the active warnings and the message currently on
//! display; with more than one warning, [`Cautioner::tick`] rotates through
//! them. [`WarningsMirror`] keeps it in sync with `SmartDashboard/Warnings`:
//!
//! - `AddQueue` / `RemoveQueue`: string arrays the robot fills; consumed
//!   and cleared by the dashboard
//! - `CurrentWarnings`: the full list, written by whichever side changed it

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::NtResult;
use crate::path;
use crate::sync::SyncClient;

pub const WARNINGS_TABLE: &str = "SmartDashboard/Warnings";
pub const ADD_QUEUE_KEY: &str = "AddQueue";
pub const REMOVE_QUEUE_KEY: &str = "RemoveQueue";
pub const CURRENT_WARNINGS_KEY: &str = "CurrentWarnings";

/// Shown when nothing is wrong
pub const DEFAULT_MESSAGE: &str = "Master Caution";

/// Seconds between rotations when several warnings are active
pub const ROTATE_INTERVAL_SECS: u64 = 3;

/// Writes to `CurrentWarnings` remembered while their echo is outstanding
const MAX_PENDING_ECHOES: usize = 16;

#[derive(Debug, Clone)]
pub struct Cautioner {
    warnings: Vec<String>,
    /// Index shown by the last rotation
    cursor: Option<usize>,
    message: String,
}

impl Default for Cautioner {
    fn default() -> Self {
        Self {
            warnings: Vec::new(),
            cursor: None,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl Cautioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_warning(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Several warnings share the display
    pub fn is_rotating(&self) -> bool {
        self.warnings.len() > 1
    }

    /// Add a warning; false if it is already active
    pub fn set_warning(&mut self, text: &str) -> bool {
        if self.warnings.iter().any(|w| w == text) {
            return false;
        }
        self.warnings.push(text.to_string());
        if self.warnings.len() == 1 {
            self.message = text.to_string();
        }
        true
    }

    /// Remove a warning; false if it was not active
    pub fn stop_warning(&mut self, text: &str) -> bool {
        let Some(index) = self.warnings.iter().position(|w| w == text) else {
            return false;
        };
        self.warnings.remove(index);

        match self.warnings.as_slice() {
            [] => {
                self.message = DEFAULT_MESSAGE.to_string();
                self.cursor = None;
            }
            [only] => self.message = only.clone(),
            _ => {}
        }
        true
    }

    /// Replace the whole list, keeping the order of warnings that stay
    pub fn replace(&mut self, warnings: &[String]) {
        let stale: Vec<String> = self
            .warnings
            .iter()
            .filter(|w| !warnings.contains(w))
            .cloned()
            .collect();
        for warning in &stale {
            self.stop_warning(warning);
        }
        for warning in warnings {
            self.set_warning(warning);
        }
    }

    /// Advance the rotation; no-op unless several warnings are active
    pub fn tick(&mut self) {
        if !self.is_rotating() {
            return;
        }
        let next = self.cursor.map_or(0, |c| c + 1);
        let next = if next >= self.warnings.len() { 0 } else { next };
        self.cursor = Some(next);
        self.message = self.warnings[next].clone();
    }
}

struct MirrorState {
    cautioner: Cautioner,
    /// Lists we wrote to `CurrentWarnings` whose echo has not come back yet
    pending_echoes: VecDeque<Vec<String>>,
}

/// Binds a [`Cautioner`] to the warnings table
#[derive(Clone)]
pub struct WarningsMirror {
    client: SyncClient,
    state: Arc<Mutex<MirrorState>>,
}

impl WarningsMirror {
    pub fn new(client: SyncClient) -> NtResult<Self> {
        let mirror = Self {
            client: client.clone(),
            state: Arc::new(Mutex::new(MirrorState {
                cautioner: Cautioner::new(),
                pending_echoes: VecDeque::new(),
            })),
        };

        let handle = mirror.clone();
        client.add_string_array_listener(&path::join(WARNINGS_TABLE, ADD_QUEUE_KEY), move |items| {
            handle.on_queue(ADD_QUEUE_KEY, &items)
        })?;
        let handle = mirror.clone();
        client.add_string_array_listener(
            &path::join(WARNINGS_TABLE, REMOVE_QUEUE_KEY),
            move |items| handle.on_queue(REMOVE_QUEUE_KEY, &items),
        )?;
        let handle = mirror.clone();
        client.add_string_array_listener(
            &path::join(WARNINGS_TABLE, CURRENT_WARNINGS_KEY),
            move |items| handle.on_current(items),
        )?;

        // Echoes of writes from an earlier connection are dropped as stale
        let handle = mirror.clone();
        client.on_connection(move |_connected| handle.lock().pending_echoes.clear());

        Ok(mirror)
    }

    fn lock(&self) -> MutexGuard<'_, MirrorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_queue(&self, key: &str, items: &[String]) {
        // Our own clear comes back as an empty queue
        if items.is_empty() {
            return;
        }
        {
            let mut state = self.lock();
            for item in items {
                if key == ADD_QUEUE_KEY {
                    state.cautioner.set_warning(item);
                } else {
                    state.cautioner.stop_warning(item);
                }
            }
        }
        debug!("Consumed {} entries from {}", items.len(), key);
        self.client
            .set_string_array(&path::join(WARNINGS_TABLE, key), Vec::new());
        self.publish();
    }

    fn on_current(&self, items: Vec<String>) {
        let mut state = self.lock();
        if let Some(index) = state.pending_echoes.iter().position(|w| *w == items) {
            state.pending_echoes.drain(..=index);
            return;
        }
        debug!("Remote warnings changed: {:?}", items);
        state.cautioner.replace(&items);
    }

    /// Write the local list to `CurrentWarnings`
    fn publish(&self) -> bool {
        let current = path::join(WARNINGS_TABLE, CURRENT_WARNINGS_KEY);
        let warnings = self.lock().cautioner.warnings().to_vec();

        // An unchanged value produces no echo
        if self.client.get_string_array(&current).as_ref() == Some(&warnings) {
            return true;
        }
        {
            let mut state = self.lock();
            state.pending_echoes.push_back(warnings.clone());
            if state.pending_echoes.len() > MAX_PENDING_ECHOES {
                state.pending_echoes.pop_front();
            }
        }
        if self.client.set_string_array(&current, warnings) {
            return true;
        }
        self.lock().pending_echoes.pop_back();
        false
    }

    /// Raise a warning locally and share it
    pub fn add_warning(&self, text: &str) -> bool {
        let added = self.lock().cautioner.set_warning(text);
        if added {
            self.publish();
        }
        added
    }

    /// Clear a warning locally and share it
    pub fn remove_warning(&self, text: &str) -> bool {
        let removed = self.lock().cautioner.stop_warning(text);
        if removed {
            self.publish();
        }
        removed
    }

    pub fn tick(&self) {
        self.lock().cautioner.tick();
    }

    pub fn message(&self) -> String {
        self.lock().cautioner.message().to_string()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock().cautioner.warnings().to_vec()
    }

    pub fn is_warning(&self) -> bool {
        self.lock().cautioner.is_warning()
    }
}
