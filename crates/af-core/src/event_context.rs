//! Per-dispatch wrapper around one event

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::{is_private_key, ContextError, Event, EventType};

type Extension = Arc<dyn Any + Send + Sync>;

/// One incoming event plus the metadata written while it is dispatched
///
/// `EventContext` is a cheap, cloneable handle: clones share the same
/// metadata. Metadata writes are atomic per key and may happen from several
/// threads (for example an asynchronous action completing later). A stored
/// `Value::Null` is distinct from an absent key.
///
/// Typed extensions hold engine attachments that are not JSON values, such
/// as the active trace recorder. At most one value per type is attached.
#[derive(Clone)]
pub struct EventContext {
    inner: Arc<Inner>,
}

struct Inner {
    event: Event,
    metadata: DashMap<String, Value>,
    extensions: DashMap<TypeId, Extension>,
    created_at: DateTime<Utc>,
}

impl EventContext {
    /// Wrap an event, rejecting events without a type
    pub fn new(event: Event) -> Result<Self, ContextError> {
        if event.event_type.as_str().trim().is_empty() {
            return Err(ContextError::EmptyEventType);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                event,
                metadata: DashMap::new(),
                extensions: DashMap::new(),
                created_at: Utc::now(),
            }),
        })
    }

    /// Build an event with a fresh context and wrap it
    pub fn from_data(event_type: impl Into<EventType>, data: Value) -> Result<Self, ContextError> {
        Self::new(Event::new(event_type, data, crate::Context::new()))
    }

    /// The wrapped event
    pub fn event(&self) -> &Event {
        &self.inner.event
    }

    /// The event's type
    pub fn event_type(&self) -> &EventType {
        &self.inner.event.event_type
    }

    /// The causality id of the wrapped event
    pub fn id(&self) -> &str {
        &self.inner.event.context.id
    }

    /// When this context was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Get a metadata value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.metadata.get(key).map(|v| v.value().clone())
    }

    /// Check whether a metadata key is present (including explicit nulls)
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.metadata.contains_key(key)
    }

    /// Store a metadata value, returning the previous one
    pub fn put(&self, key: impl Into<String>, value: Value) -> Result<Option<Value>, ContextError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ContextError::EmptyKey);
        }
        Ok(self.inner.metadata.insert(key, value))
    }

    /// Store a metadata value only if the key is absent
    ///
    /// Returns the existing value when the key was already present. A key
    /// holding `Value::Null` counts as present.
    pub fn put_if_absent(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, ContextError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ContextError::EmptyKey);
        }

        match self.inner.metadata.entry(key) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(None)
            }
        }
    }

    /// Remove a metadata value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.metadata.remove(key).map(|(_, v)| v)
    }

    /// Snapshot of all metadata, including private keys
    pub fn metadata(&self) -> Map<String, Value> {
        self.inner
            .metadata
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Merged view of the event payload and metadata
    ///
    /// Object payloads contribute their fields; any other payload is exposed
    /// under `data`. Metadata entries override payload fields of the same name.
    pub fn event_data(&self) -> Map<String, Value> {
        let mut merged = match &self.inner.event.data {
            Value::Object(fields) => fields.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other.clone());
                map
            }
        };

        for entry in self.inner.metadata.iter() {
            merged.insert(entry.key().clone(), entry.value().clone());
        }

        merged
    }

    /// Like [`Self::event_data`] with engine-private keys removed
    pub fn public_event_data(&self) -> Map<String, Value> {
        let mut data = self.event_data();
        data.retain(|key, _| !is_private_key(key));
        data
    }

    /// Get the attached extension of type `T`
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let erased = self.inner.extensions.get(&TypeId::of::<T>())?.value().clone();
        erased.downcast::<T>().ok()
    }

    /// Get the attached extension of type `T`, attaching `init()` if none is present
    pub fn get_or_insert_extension<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.extension::<T>() {
            return existing;
        }

        let fresh = Arc::new(init());
        let stored = self
            .inner
            .extensions
            .entry(TypeId::of::<T>())
            .or_insert_with(|| fresh.clone() as Extension)
            .value()
            .clone();

        // A concurrent caller may have attached first; theirs wins.
        stored.downcast::<T>().unwrap_or(fresh)
    }

    /// Detach the extension of type `T`
    pub fn remove_extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let (_, erased) = self.inner.extensions.remove(&TypeId::of::<T>())?;
        erased.downcast::<T>().ok()
    }

    /// Check whether two handles refer to the same context
    pub fn ptr_eq(&self, other: &EventContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event_type", &self.inner.event.event_type)
            .field("id", &self.inner.event.context.id)
            .field("metadata_keys", &self.inner.metadata.len())
            .finish()
    }
}
