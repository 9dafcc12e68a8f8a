//! Priority-ordered table of speech backends
//!
//! Entries are sorted by descending priority. A new entry goes in front of
//! the first entry whose priority is lower than or equal to its own, so
//! among equal priorities the most recently registered backend comes first.
//!
//! Instances come out of the registry two ways:
//! - `create*` builds a fresh instance owned only by the caller.
//! - `acquire*` shares one instance per entry. The registry keeps only a
//!   weak reference, so the instance dies with its last caller-held handle
//!   and the next `acquire` builds a new one.
//!
//! One `RwLock` guards the table. Lookups take it shared; `register`,
//! `acquire`, `acquire_best` and `clear_cache` take it exclusively, so
//! `acquire_best` holds the lock across backend initialization. `create`
//! and `create_best` copy the factories out and release the lock before
//! calling into backend code; they never touch the cache.

use crate::backend::{SharedBackend, TextToSpeechBackend};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Stable identifier of a registered backend; `0` is never a valid id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BackendId(pub u64);

impl BackendId {
    pub const INVALID: BackendId = BackendId(0);

    /// Derive an id from a backend name (64-bit FNV-1a)
    ///
    /// Usable in constants, so well-known ids are fixed at compile time.
    pub const fn from_name(name: &str) -> BackendId {
        let bytes = name.as_bytes();
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            i += 1;
        }
        if hash == 0 {
            hash = 1;
        }
        BackendId(hash)
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Key for looking a backend up by id or by display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(BackendId),
    Name(&'a str),
}

impl From<BackendId> for Lookup<'_> {
    fn from(id: BackendId) -> Self {
        Lookup::Id(id)
    }
}

impl<'a> From<&'a str> for Lookup<'a> {
    fn from(name: &'a str) -> Self {
        Lookup::Name(name)
    }
}

/// Builds a new, uninitialized backend instance
pub type Factory = Arc<dyn Fn() -> SharedBackend + Send + Sync>;

struct Entry {
    id: BackendId,
    name: String,
    priority: i32,
    factory: Factory,
    cached: Option<Weak<Mutex<dyn TextToSpeechBackend>>>,
}

impl Entry {
    fn matches(&self, key: Lookup<'_>) -> bool {
        match key {
            Lookup::Id(id) => self.id == id,
            Lookup::Name(name) => self.name == name,
        }
    }

    fn live_instance(&self) -> Option<SharedBackend> {
        self.cached.as_ref().and_then(Weak::upgrade)
    }
}

/// Instance succeeded `initialize`, or why it was skipped
fn try_initialize(id: BackendId, name: &str, backend: &SharedBackend) -> bool {
    let result = match backend.lock() {
        Ok(mut guard) => guard.initialize(),
        Err(_) => {
            warn!("Backend {} lock poisoned during initialization", name);
            return false;
        }
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            info!("✗ Backend {} ({}) unavailable: {}", name, id, e);
            false
        }
    }
}

/// Registry of speech backends
#[derive(Default)]
pub struct BackendRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a backend factory
    ///
    /// Registering an id that is already present replaces the old entry.
    pub fn register<B, F>(&self, id: BackendId, name: &str, priority: i32, factory: F)
    where
        B: TextToSpeechBackend + 'static,
        F: Fn() -> B + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || -> SharedBackend { Arc::new(Mutex::new(factory())) });
        self.register_factory(id, name, priority, factory);
    }

    /// Register a type-erased factory
    pub fn register_factory(&self, id: BackendId, name: &str, priority: i32, factory: Factory) {
        let mut entries = self.write();
        if let Some(pos) = entries.iter().position(|e| e.id == id) {
            warn!("Backend id {} re-registered, replacing {}", id, entries[pos].name);
            entries.remove(pos);
        }
        let pos = entries
            .iter()
            .position(|e| e.priority <= priority)
            .unwrap_or(entries.len());
        debug!("Registering backend {} ({}) at priority {} (slot {})", name, id, priority, pos);
        entries.insert(
            pos,
            Entry {
                id,
                name: name.to_string(),
                priority,
                factory,
                cached: None,
            },
        );
    }

    /// Registered ids in priority order
    pub fn list(&self) -> Vec<BackendId> {
        self.read().iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn has<'a>(&self, key: impl Into<Lookup<'a>>) -> bool {
        let key = key.into();
        self.read().iter().any(|e| e.matches(key))
    }

    pub fn name(&self, id: BackendId) -> Option<String> {
        self.read().iter().find(|e| e.id == id).map(|e| e.name.clone())
    }

    pub fn id(&self, name: &str) -> Option<BackendId> {
        self.read().iter().find(|e| e.name == name).map(|e| e.id)
    }

    pub fn priority(&self, id: BackendId) -> Option<i32> {
        self.read().iter().find(|e| e.id == id).map(|e| e.priority)
    }

    /// The cached instance, if one is still alive; never constructs
    pub fn get<'a>(&self, key: impl Into<Lookup<'a>>) -> Option<SharedBackend> {
        let key = key.into();
        self.read()
            .iter()
            .find(|e| e.matches(key))
            .and_then(Entry::live_instance)
    }

    /// Build a fresh, uninitialized instance owned only by the caller
    pub fn create<'a>(&self, key: impl Into<Lookup<'a>>) -> Option<SharedBackend> {
        let key = key.into();
        let factory = self
            .read()
            .iter()
            .find(|e| e.matches(key))
            .map(|e| Arc::clone(&e.factory))?;
        Some(factory())
    }

    /// Build and initialize candidates in priority order, returning the first that works
    ///
    /// Every failed candidate is constructed and initialized before being
    /// dropped, so this can be slow and has side effects on each of them.
    pub fn create_best(&self) -> Option<SharedBackend> {
        let candidates: Vec<(BackendId, String, Factory)> = self
            .read()
            .iter()
            .map(|e| (e.id, e.name.clone(), Arc::clone(&e.factory)))
            .collect();
        for (id, name, factory) in candidates {
            debug!("Trying backend {}", name);
            let backend = factory();
            if try_initialize(id, &name, &backend) {
                info!("✓ Selected backend {}", name);
                return Some(backend);
            }
        }
        warn!("No speech backend could be initialized");
        None
    }

    /// Shared instance for one entry, constructing (not initializing) it if needed
    pub fn acquire<'a>(&self, key: impl Into<Lookup<'a>>) -> Option<SharedBackend> {
        let key = key.into();
        let mut entries = self.write();
        let entry = entries.iter_mut().find(|e| e.matches(key))?;
        if let Some(existing) = entry.live_instance() {
            return Some(existing);
        }
        debug!("Constructing shared instance of {}", entry.name);
        let backend = (entry.factory)();
        entry.cached = Some(Arc::downgrade(&backend));
        Some(backend)
    }

    /// Shared instance of the best backend that initializes
    ///
    /// A live cached instance of a higher-priority entry wins without being
    /// re-initialized. The exclusive lock is held throughout, so at most one
    /// instance per entry is ever resolved.
    pub fn acquire_best(&self) -> Option<SharedBackend> {
        let mut entries = self.write();
        for entry in entries.iter_mut() {
            if let Some(existing) = entry.live_instance() {
                return Some(existing);
            }
            debug!("Trying backend {}", entry.name);
            let backend = (entry.factory)();
            if try_initialize(entry.id, &entry.name, &backend) {
                info!("✓ Selected backend {}", entry.name);
                entry.cached = Some(Arc::downgrade(&backend));
                return Some(backend);
            }
        }
        warn!("No speech backend could be initialized");
        None
    }

    /// Forget every cached instance; callers keep theirs
    pub fn clear_cache(&self) {
        debug!("Clearing backend cache");
        for entry in self.write().iter_mut() {
            entry.cached = None;
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.read();
        f.debug_list()
            .entries(entries.iter().map(|e| (e.id, &e.name, e.priority)))
            .finish()
    }
}
