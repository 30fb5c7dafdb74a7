//! In-memory contact store with staleness tracking.
//!
//! Approved contacts and not-yet-approved ("pending") contacts live in
//! separate tables keyed by public key. The cache also remembers the
//! high-water `last_modified` stamp from the last enumeration so the next
//! refresh can ask only for newer records.

use std::collections::HashMap;

use companion_protocol::{ContactInfo, Event, PublicKey};
use parking_lot::Mutex;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct CacheState {
    contacts: HashMap<PublicKey, ContactInfo>,
    pending: HashMap<PublicKey, ContactInfo>,
    dirty: bool,
    last_modified: u32,
}

/// Thread-safe contact cache.
#[derive(Debug, Default)]
pub struct ContactCache {
    state: Mutex<CacheState>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every approved contact with a fresh enumeration.
    pub fn update_cache(&self, contacts: Vec<ContactInfo>, last_modified: u32) {
        let mut state = self.state.lock();
        state.contacts = contacts
            .into_iter()
            .map(|contact| (contact.public_key, contact))
            .collect();
        state.last_modified = last_modified;
        state.dirty = false;
        debug!(count = state.contacts.len(), last_modified, "contact cache replaced");
    }

    /// Merge an incremental enumeration.
    pub fn merge(&self, contacts: Vec<ContactInfo>, last_modified: u32) {
        let mut state = self.state.lock();
        for contact in contacts {
            state.contacts.insert(contact.public_key, contact);
        }
        state.last_modified = state.last_modified.max(last_modified);
        state.dirty = false;
    }

    /// Insert or replace one contact.
    pub fn store(&self, contact: ContactInfo) {
        let mut state = self.state.lock();
        state.last_modified = state.last_modified.max(contact.last_modified);
        state.contacts.insert(contact.public_key, contact);
    }

    pub fn remove(&self, key: &PublicKey) -> Option<ContactInfo> {
        self.state.lock().contacts.remove(key)
    }

    pub fn get(&self, key: &PublicKey) -> Option<ContactInfo> {
        self.state.lock().contacts.get(key).cloned()
    }

    /// Every approved contact, ordered by name.
    pub fn contacts(&self) -> Vec<ContactInfo> {
        let mut contacts: Vec<_> = self.state.lock().contacts.values().cloned().collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name).then(a.public_key.cmp(&b.public_key)));
        contacts
    }

    pub fn len(&self) -> usize {
        self.state.lock().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a contact by name: exact (case-sensitive) equality, or a
    /// case-insensitive substring match when `exact` is false.
    pub fn find_by_name(&self, name: &str, exact: bool) -> Option<ContactInfo> {
        let needle = name.to_lowercase();
        self.contacts().into_iter().find(|contact| {
            if exact {
                contact.name == name
            } else {
                contact.name.to_lowercase().contains(&needle)
            }
        })
    }

    /// Find a contact whose key starts with `prefix`.
    pub fn find_by_key_prefix(&self, prefix: &[u8]) -> Option<ContactInfo> {
        if prefix.is_empty() {
            return None;
        }
        self.contacts()
            .into_iter()
            .find(|contact| contact.public_key.as_bytes().starts_with(prefix))
    }

    /// Find a contact whose hex-rendered key starts with `prefix`
    /// (case-insensitive, odd lengths allowed).
    pub fn find_by_hex_prefix(&self, prefix: &str) -> Option<ContactInfo> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return None;
        }
        self.contacts()
            .into_iter()
            .find(|contact| contact.public_key.to_hex().starts_with(&prefix))
    }

    /// Hold a discovered contact until the user approves it.
    pub fn add_pending(&self, contact: ContactInfo) {
        let mut state = self.state.lock();
        trace!(name = %contact.name, "pending contact added");
        state.pending.insert(contact.public_key, contact);
    }

    /// Take a pending contact out of the holding area.
    pub fn pop_pending(&self, key: &PublicKey) -> Option<ContactInfo> {
        self.state.lock().pending.remove(key)
    }

    pub fn pending(&self) -> Vec<ContactInfo> {
        let mut pending: Vec<_> = self.state.lock().pending.values().cloned().collect();
        pending.sort_by(|a, b| a.name.cmp(&b.name));
        pending
    }

    /// Drop every pending contact, returning them.
    pub fn flush_pending(&self) -> Vec<ContactInfo> {
        self.state.lock().pending.drain().map(|(_, c)| c).collect()
    }

    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// High-water `last_modified` stamp.
    pub fn last_modified(&self) -> u32 {
        self.state.lock().last_modified
    }

    /// Drop everything, including pending contacts and the high-water mark.
    pub fn clear(&self) {
        *self.state.lock() = CacheState::default();
    }

    /// Apply a live event to the cache.
    pub fn track_event(&self, event: &Event) {
        match event {
            Event::NewAdvert(contact) => {
                self.add_pending(contact.clone());
                self.mark_dirty();
            }
            Event::Contact(contact) => self.store(contact.clone()),
            Event::EndOfContacts { last_modified } => {
                let mut state = self.state.lock();
                state.last_modified = state.last_modified.max(*last_modified);
                state.dirty = false;
            }
            // The authoritative record arrives through the next enumeration.
            Event::Advert { .. } | Event::PathUpdated { .. } => self.mark_dirty(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(byte: u8, name: &str, last_modified: u32) -> ContactInfo {
        ContactInfo {
            public_key: PublicKey([byte; 32]),
            name: name.to_string(),
            last_modified,
            ..ContactInfo::default()
        }
    }

    #[test]
    fn test_update_cache_replaces_and_clears_dirty() {
        let cache = ContactCache::new();
        cache.store(contact(1, "stale", 10));
        cache.mark_dirty();

        cache.update_cache(vec![contact(2, "alice", 20), contact(3, "bob", 30)], 30);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&PublicKey([1; 32])).is_none());
        assert!(!cache.is_dirty());
        assert_eq!(cache.last_modified(), 30);
    }

    #[test]
    fn test_merge_keeps_existing() {
        let cache = ContactCache::new();
        cache.update_cache(vec![contact(1, "alice", 10)], 10);
        cache.merge(vec![contact(2, "bob", 15)], 15);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.last_modified(), 15);
    }

    #[test]
    fn test_find_by_name() {
        let cache = ContactCache::new();
        cache.store(contact(1, "Alice Repeater", 0));
        cache.store(contact(2, "bob", 0));

        assert_eq!(
            cache.find_by_name("alice", false).map(|c| c.name),
            Some("Alice Repeater".to_string())
        );
        assert!(cache.find_by_name("alice", true).is_none());
        assert!(cache.find_by_name("bob", true).is_some());
        assert!(cache.find_by_name("carol", false).is_none());
    }

    #[test]
    fn test_find_by_prefix() {
        let cache = ContactCache::new();
        let mut key = [0u8; 32];
        key[0] = 0xAB;
        key[1] = 0xCD;
        cache.store(ContactInfo {
            public_key: PublicKey(key),
            name: "node".into(),
            ..ContactInfo::default()
        });

        assert!(cache.find_by_key_prefix(&[0xAB, 0xCD]).is_some());
        assert!(cache.find_by_key_prefix(&[0xAB, 0xCE]).is_none());
        assert!(cache.find_by_key_prefix(&[]).is_none());
        assert!(cache.find_by_hex_prefix("ABc").is_some());
        assert!(cache.find_by_hex_prefix("abce").is_none());
    }

    #[test]
    fn test_pending_holding_area() {
        let cache = ContactCache::new();
        cache.add_pending(contact(1, "new", 0));
        cache.add_pending(contact(2, "other", 0));
        assert_eq!(cache.pending().len(), 2);
        assert!(cache.is_empty());

        let popped = cache.pop_pending(&PublicKey([1; 32])).unwrap();
        assert_eq!(popped.name, "new");
        assert!(cache.pop_pending(&PublicKey([1; 32])).is_none());

        assert_eq!(cache.flush_pending().len(), 1);
        assert!(cache.pending().is_empty());
    }

    #[test]
    fn test_track_event() {
        let cache = ContactCache::new();

        cache.track_event(&Event::NewAdvert(contact(1, "stranger", 0)));
        assert_eq!(cache.pending().len(), 1);
        assert!(cache.is_dirty());
        assert!(cache.is_empty());

        cache.track_event(&Event::Contact(contact(2, "friend", 40)));
        assert!(cache.get(&PublicKey([2; 32])).is_some());

        cache.track_event(&Event::EndOfContacts { last_modified: 50 });
        assert!(!cache.is_dirty());
        assert_eq!(cache.last_modified(), 50);

        let before = cache.get(&PublicKey([2; 32]));
        cache.track_event(&Event::Advert {
            public_key: PublicKey([2; 32]),
        });
        assert!(cache.is_dirty());
        assert_eq!(cache.get(&PublicKey([2; 32])), before);
    }
}
