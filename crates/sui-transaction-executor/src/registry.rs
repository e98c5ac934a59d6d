// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An explicit registry of named executor handles with change notification.
//! Passed by reference to interested components; there is no process-wide
//! singleton. Subscribers hold a receiver and drop it to unsubscribe.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum RegistryEvent {
    Registered(String),
    Removed(String),
}

pub struct ExecutorRegistry<T: ?Sized> {
    entries: RwLock<HashMap<String, Arc<T>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl<T: ?Sized> ExecutorRegistry<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Registers a handle under `name`, replacing any previous one. Returns
    /// the replaced handle, if any.
    pub fn register(&self, name: impl Into<String>, handle: Arc<T>) -> Option<Arc<T>> {
        let name = name.into();
        let previous = self.entries.write().insert(name.clone(), handle);
        let _ = self.events.send(RegistryEvent::Registered(name));
        previous
    }

    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        let removed = self.entries.write().remove(name);
        if removed.is_some() {
            let _ = self.events.send(RegistryEvent::Removed(name.to_string()));
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

impl<T: ?Sized> Default for ExecutorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
