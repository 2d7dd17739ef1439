//! Message type registry: two-keyed lookup from type id or name to a
//! prototype.
//!
//! The registry is plain data with no locking. The engine mutates it only
//! while the socket is in its initial state and freezes a snapshot when a
//! connection is established, so the receive thread reads it without
//! synchronization.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{ProtocolError, Result};
use crate::message::{Message, Prototype};

/// A source of message prototypes, standing in for a schema description.
///
/// This is the seam for "register every type a schema file declares".
/// Loading and parsing the schema format is the implementor's concern; the
/// registry only consumes the resulting prototypes.
pub trait TypeSource {
    /// Produce the prototypes this source declares
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the source cannot be loaded.
    fn load_types(&self) -> Result<Vec<Arc<dyn Prototype>>>;
}

impl TypeSource for [Arc<dyn Prototype>] {
    fn load_types(&self) -> Result<Vec<Arc<dyn Prototype>>> {
        Ok(self.to_vec())
    }
}

impl TypeSource for Vec<Arc<dyn Prototype>> {
    fn load_types(&self) -> Result<Vec<Arc<dyn Prototype>>> {
        self.as_slice().load_types()
    }
}

/// Registry of message types, keyed by numeric id and by name.
///
/// # Invariants
///
/// - Type ids and type names are each unique within one registry.
/// - `Clone` is cheap: prototypes are shared via `Arc`, so a clone is a
///   frozen snapshot of the table, not a copy of the factories.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    by_id: HashMap<u32, Arc<dyn Prototype>>,
    by_name: HashMap<String, u32>,
}

impl TypeRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single prototype
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DuplicateType`] if the id or the name is
    /// already taken; the registry is left unchanged.
    pub fn register(&mut self, prototype: Arc<dyn Prototype>) -> Result<()> {
        let id = prototype.type_id();
        let name = prototype.type_name().to_string();

        if self.by_id.contains_key(&id) || self.by_name.contains_key(&name) {
            return Err(ProtocolError::DuplicateType { id, name });
        }

        self.by_name.insert(name, id);
        self.by_id.insert(id, prototype);
        Ok(())
    }

    /// Register every prototype a source declares
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. Prototypes registered before the
    /// failing one stay registered.
    pub fn register_source(&mut self, source: &dyn TypeSource) -> Result<()> {
        for prototype in source.load_types()? {
            self.register(prototype)?;
        }
        Ok(())
    }

    /// Look up a prototype by type id
    #[must_use]
    pub fn prototype(&self, type_id: u32) -> Option<&Arc<dyn Prototype>> {
        self.by_id.get(&type_id)
    }

    /// Resolve a type name to its id
    #[must_use]
    pub fn type_id_of(&self, type_name: &str) -> Option<u32> {
        self.by_name.get(type_name).copied()
    }

    /// Create a fresh empty instance by type id
    ///
    /// Returns `None` if the id is unregistered. An unknown type is a
    /// recoverable condition (the peer may speak a newer schema), not an
    /// error.
    #[must_use]
    pub fn create(&self, type_id: u32) -> Option<Box<dyn Message>> {
        self.by_id.get(&type_id).map(|p| p.create())
    }

    /// Create a fresh empty instance by type name
    #[must_use]
    pub fn create_by_name(&self, type_name: &str) -> Option<Box<dyn Message>> {
        self.type_id_of(type_name).and_then(|id| self.create(id))
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over registered `(type_id, type_name)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_id.iter().map(|(id, proto)| (*id, proto.type_name()))
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (id, proto) in &self.by_id {
            map.entry(id, &proto.type_name());
        }
        map.finish()
    }
}
