//! Topic-name ⇄ topic-id registry.
//!
//! PUBLISH frames carry a 16-bit topic id instead of the topic string, so the
//! client keeps a small bidirectional map of every binding it learns: ids it
//! requested through REGISTER, ids the gateway pushed with its own REGISTER,
//! and ids granted in SUBACK. The registry is bounded; when it fills, the
//! least-recently-used entry is evicted.

#![deny(unsafe_code)]

use super::MAX_TOPIC_LEN;
use heapless::{String, Vec};

/// Number of bindings the registry can hold.
pub const MAX_TOPICS: usize = 20;

/// Topic id 0 is reserved; clients use it in REGISTER to request an
/// assignment.
pub const TOPIC_ID_UNASSIGNED: u16 = 0;

/// Where a binding came from, which decides who may overwrite it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TopicSource {
    /// Provisionally chosen by the client, pending a REGACK.
    SelfRegistered,
    /// Assigned by the gateway in a REGACK or gateway-initiated REGISTER.
    GatewayRegistered,
    /// Assigned by the gateway in a SUBACK.
    SubackAssigned,
}

/// One name ⇄ id binding.
#[derive(Debug, Clone)]
pub struct TopicEntry {
    /// The topic name.
    pub name: String<MAX_TOPIC_LEN>,
    /// The bound topic id.
    pub id: u16,
    /// Provenance of the binding.
    pub source: TopicSource,
    last_used: u32,
}

/// A bounded, LRU-evicting topic registry.
///
/// Names are unique and ids are unique: inserting a binding removes any
/// other entry holding the same id, and re-inserting a known name updates it
/// in place (gateway-assigned ids overwrite whatever the client had
/// provisionally recorded).
///
/// # Examples
///
/// ```rust
/// use tinysn::network::application::mqttsn::topics::{TopicRegistry, TopicSource};
///
/// let mut registry = TopicRegistry::new();
/// registry.insert_or_update("sensors/temp", 7, TopicSource::GatewayRegistered).unwrap();
///
/// assert_eq!(registry.find_by_name("sensors/temp"), Some(7));
/// assert_eq!(registry.find_by_id(7), Some("sensors/temp"));
/// ```
#[derive(Debug, Default)]
pub struct TopicRegistry {
    entries: Vec<TopicEntry, MAX_TOPICS>,
    tick: u32,
}

impl TopicRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            tick: 0,
        }
    }

    fn touch(&mut self) -> u32 {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }

    /// Inserts a binding, or updates the existing entry for `name`.
    ///
    /// When the registry is full the least-recently-used entry is replaced.
    /// Any other entry already holding `id` is removed first so ids stay
    /// unique.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if `name` exceeds [`MAX_TOPIC_LEN`] bytes.
    pub fn insert_or_update(
        &mut self,
        name: &str,
        id: u16,
        source: TopicSource,
    ) -> Result<(), ()> {
        let stamp = self.touch();

        // Ids are unique across names.
        self.entries
            .retain(|entry| entry.id != id || entry.name.as_str() == name);

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.name.as_str() == name)
        {
            entry.id = id;
            entry.source = source;
            entry.last_used = stamp;
            return Ok(());
        }

        let entry = TopicEntry {
            name: String::try_from(name).map_err(|_| ())?,
            id,
            source,
            last_used: stamp,
        };

        if self.entries.is_full() {
            let lru = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.entries[lru] = entry;
        } else {
            // Capacity checked above.
            let _ = self.entries.push(entry);
        }
        Ok(())
    }

    /// Looks up the id bound to `name`, refreshing its recency.
    pub fn find_by_name(&mut self, name: &str) -> Option<u16> {
        let stamp = self.touch();
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.name.as_str() == name)?;
        entry.last_used = stamp;
        Some(entry.id)
    }

    /// Looks up the name bound to `id`.
    pub fn find_by_id(&self, id: u16) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
    }

    /// Provenance of the binding for `name`, if any.
    pub fn source_of(&self, name: &str) -> Option<TopicSource> {
        self.entries
            .iter()
            .find(|entry| entry.name.as_str() == name)
            .map(|entry| entry.source)
    }

    /// Removes every binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of bindings currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
