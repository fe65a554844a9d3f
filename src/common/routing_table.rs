//! Simplified Kademlia routing table

use std::collections::BTreeMap;
use std::slice::Iter;
use std::sync::{Arc, RwLock};

use crate::common::{Contact, Id};
use crate::lookup::ClosestContacts;

/// K = the default maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// Source of the initial candidates of a lookup.
pub trait NearestContacts {
    /// Return up to `limit` known contacts closest to `target`.
    ///
    /// No particular order is required, the lookup sorts them.
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact>;
}

#[derive(Debug, Clone)]
/// Simplified Kademlia routing table
pub struct RoutingTable {
    id: Id,
    buckets: BTreeMap<u8, KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id.
    pub fn new(id: Id) -> Self {
        let buckets = BTreeMap::new();

        RoutingTable { id, buckets }
    }

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    // === Public Methods ===

    /// Attempts to add a contact to this routing table, and return `true` if it did.
    pub fn add(&mut self, contact: Contact) -> bool {
        let distance = self.id.distance(contact.id());

        if distance == 0 {
            // Do not add self to the routing_table
            return false;
        }

        let bucket = self.buckets.entry(distance).or_default();

        bucket.add(contact)
    }

    /// Remove a contact from this routing table.
    pub fn remove(&mut self, id: &Id) {
        let distance = self.id.distance(id);

        if let Some(bucket) = self.buckets.get_mut(&distance) {
            bucket.remove(id)
        }
    }

    /// Return up to `limit` contacts closest to the target.
    pub fn closest(&self, target: &Id, limit: usize) -> Vec<Contact> {
        let mut closest = ClosestContacts::new(*target, limit);

        for bucket in self.buckets.values() {
            closest.merge(bucket.iter().copied());
        }

        closest.into_contacts()
    }

    /// Returns `true` if this routing table contains a contact with this [Id].
    pub fn contains(&self, id: &Id) -> bool {
        let distance = self.id.distance(id);

        self.buckets
            .get(&distance)
            .map(|bucket| bucket.contains(id))
            .unwrap_or(false)
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.is_empty())
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.contacts.len())
    }

    /// Returns an iterator over the contacts in this routing table.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.buckets.values().flat_map(|bucket| bucket.iter())
    }
}

impl NearestContacts for RoutingTable {
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact> {
        self.closest(target, limit)
    }
}

impl NearestContacts for RwLock<RoutingTable> {
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact> {
        match self.read() {
            Ok(table) => table.closest(target, limit),
            Err(poisoned) => poisoned.into_inner().closest(target, limit),
        }
    }
}

impl NearestContacts for [Contact] {
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact> {
        let mut closest = ClosestContacts::new(*target, limit);
        closest.merge(self.iter().copied());

        closest.into_contacts()
    }
}

impl NearestContacts for Vec<Contact> {
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact> {
        self.as_slice().nearest_contacts(target, limit)
    }
}

impl<T: NearestContacts + ?Sized> NearestContacts for Arc<T> {
    fn nearest_contacts(&self, target: &Id, limit: usize) -> Vec<Contact> {
        (**self).nearest_contacts(target, limit)
    }
}

/// Kbuckets hold up to [MAX_BUCKET_SIZE_K] contacts at the same distance from
/// the routing table's [Id], sorted by the least recently seen.
#[derive(Debug, Clone)]
pub struct KBucket {
    contacts: Vec<Contact>,
}

impl KBucket {
    pub fn new() -> Self {
        KBucket {
            contacts: Vec::with_capacity(MAX_BUCKET_SIZE_K),
        }
    }

    // === Public Methods ===

    pub fn add(&mut self, incoming: Contact) -> bool {
        if let Some(index) = self.iter().position(|c| c.id() == incoming.id()) {
            // Move to the end as the most recently seen, possibly updating its address.
            self.contacts.remove(index);
            self.contacts.push(incoming);

            true
        } else if self.contacts.len() < MAX_BUCKET_SIZE_K {
            self.contacts.push(incoming);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: &Id) {
        self.contacts.retain(|contact| contact.id() != id);
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    fn contains(&self, id: &Id) -> bool {
        self.iter().any(|contact| contact.id() == id)
    }
}

impl Default for KBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddrV4;

    use super::*;

    #[test]
    fn table_is_empty() {
        let mut table = RoutingTable::new(Id::random());
        assert!(table.is_empty());

        table.add(Contact::random());
        assert!(!table.is_empty());
    }

    #[test]
    fn contains() {
        let mut table = RoutingTable::new(Id::random());

        let contact = Contact::random();

        assert!(!table.contains(contact.id()));

        table.add(contact);
        assert!(table.contains(contact.id()));
    }

    #[test]
    fn remove() {
        let mut table = RoutingTable::new(Id::random());

        let contact = Contact::random();

        table.add(contact);
        assert!(table.contains(contact.id()));

        table.remove(contact.id());
        assert!(!table.contains(contact.id()));
    }

    #[test]
    fn buckets_are_sets() {
        let mut table = RoutingTable::new(Id::random());

        let contact1 = Contact::random();
        let contact2 = Contact::new(*contact1.id(), SocketAddrV4::new([0, 0, 0, 1].into(), 1).into());

        table.add(contact1);
        table.add(contact2);

        assert_eq!(table.size(), 1);
        assert_eq!(
            table.contacts().next().map(|c| c.address()),
            Some(contact2.address())
        );
    }

    #[test]
    fn should_not_add_self() {
        let mut table = RoutingTable::new(Id::random());
        let contact = Contact::new(*table.id(), SocketAddrV4::new(0.into(), 0).into());

        assert!(!table.add(contact));
        assert!(table.is_empty())
    }

    #[test]
    fn should_not_add_more_than_k() {
        let mut bucket = KBucket::new();

        for i in 0..MAX_BUCKET_SIZE_K {
            assert!(bucket.add(Contact::random()), "Failed to add contact {i}");
        }

        assert!(!bucket.add(Contact::random()));
    }

    #[test]
    fn closest() {
        let mut table = RoutingTable::new(Id::random());

        let mut contacts = Vec::new();
        for _ in 0..200 {
            let contact = Contact::random();
            if table.add(contact) {
                contacts.push(contact);
            }
        }

        let target = Id::random();
        let closest = table.nearest_contacts(&target, MAX_BUCKET_SIZE_K);

        contacts.sort_by_key(|c| c.id().xor(&target));

        assert_eq!(closest.len(), MAX_BUCKET_SIZE_K);
        assert_eq!(closest, contacts[..MAX_BUCKET_SIZE_K].to_vec());
    }

    #[test]
    fn closest_with_limit_larger_than_table() {
        let mut table = RoutingTable::new(Id::random());

        for _ in 0..3 {
            table.add(Contact::random());
        }

        let shared = Arc::new(RwLock::new(table));

        assert_eq!(shared.nearest_contacts(&Id::random(), 20).len(), 3);
    }
}
