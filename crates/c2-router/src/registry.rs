//! System registry
//!
//! Table of every remote system the console has heard of: gateways announcing
//! themselves on the network, vehicles named in discovery replies and the
//! static seed list. Entries are created on first observation and never
//! removed; losing a link only clears the activity flag.

use acomms_core::{now_ns, Coordinate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A known remote system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSystem {
    /// Unique system name
    pub name: String,
    /// Services the system has declared
    pub declared_services: BTreeSet<String>,
    /// Whether the system is currently reachable by the console
    pub is_active: bool,
    /// Last reported position
    pub last_location: Option<Coordinate>,
    /// Last observation timestamp (ns)
    pub last_seen_ns: u64,
}

impl RemoteSystem {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declared_services: BTreeSet::new(),
            is_active: false,
            last_location: None,
            last_seen_ns: now_ns(),
        }
    }

    /// Whether the system declared `service`
    pub fn provides(&self, service: &str) -> bool {
        self.declared_services.contains(service)
    }
}

/// Thread-safe registry of remote systems, ordered by name.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    systems: RwLock<BTreeMap<String, RemoteSystem>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the static seed list
    pub fn with_seed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        registry.seed(names);
        registry
    }

    /// Add names from the static seed list. Returns how many were new.
    pub fn seed<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| self.observe(name.as_ref(), None, None))
            .count()
    }

    /// Merge an observation into the table.
    ///
    /// Creates the entry if absent. Declared services are only ever added,
    /// never removed. Returns `true` when the entry is new. Blank names are
    /// ignored.
    pub fn observe(
        &self,
        name: &str,
        services: Option<&[String]>,
        location: Option<Coordinate>,
    ) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let mut systems = self.systems.write();
        let created = !systems.contains_key(name);
        let system = systems
            .entry(name.to_string())
            .or_insert_with(|| RemoteSystem::new(name));

        if let Some(services) = services {
            system
                .declared_services
                .extend(services.iter().map(|s| s.trim().to_string()));
        }
        if location.is_some() {
            system.last_location = location;
        }
        system.last_seen_ns = now_ns();

        if created {
            tracing::debug!(system = %name, "new remote system observed");
        }
        created
    }

    /// Systems declaring `service`, sorted by name. Never an error; no match
    /// is an empty vector.
    pub fn query(&self, service: &str, active_only: bool) -> Vec<RemoteSystem> {
        self.systems
            .read()
            .values()
            .filter(|s| s.provides(service) && (!active_only || s.is_active))
            .cloned()
            .collect()
    }

    /// Flag a known system as reachable. Unknown names are ignored and
    /// return `false`; only `observe` creates entries.
    pub fn mark_active(&self, name: &str) -> bool {
        self.set_active(name, true)
    }

    pub fn mark_inactive(&self, name: &str) -> bool {
        self.set_active(name, false)
    }

    fn set_active(&self, name: &str, active: bool) -> bool {
        let mut systems = self.systems.write();
        let Some(system) = systems.get_mut(name.trim()) else {
            return false;
        };
        if system.is_active != active {
            tracing::info!(system = %system.name, active, "system activity changed");
        }
        system.is_active = active;
        if active {
            system.last_seen_ns = now_ns();
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<RemoteSystem> {
        self.systems.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.systems.read().contains_key(name)
    }

    /// Snapshot of all systems, sorted by name
    pub fn list(&self) -> Vec<RemoteSystem> {
        self.systems.read().values().cloned().collect()
    }

    /// All known names, sorted
    pub fn names(&self) -> Vec<String> {
        self.systems.read().keys().cloned().collect()
    }

    pub fn location_of(&self, name: &str) -> Option<Coordinate> {
        self.systems.read().get(name).and_then(|s| s.last_location)
    }

    pub fn len(&self) -> usize {
        self.systems.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.read().is_empty()
    }
}
