//! Bounded list of the closest known contacts to a lookup target.

use std::{slice::Iter, vec::IntoIter};

use crate::common::{Contact, Id};

#[derive(Debug, Clone)]
/// Contacts sorted ascending by XOR distance to a target, without duplicate ids,
/// and never holding more than `capacity` entries.
pub struct ClosestContacts {
    target: Id,
    capacity: usize,
    contacts: Vec<Contact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What a [ClosestContacts::merge] changed.
pub struct Merge {
    /// Number of contacts that were not already present.
    pub added: usize,
    /// Whether the closest contact is a different one after the merge.
    pub head_changed: bool,
}

impl Merge {
    /// Returns `true` if the merge surfaced a contact closer than any known before.
    pub fn improved(&self) -> bool {
        self.added > 0 && self.head_changed
    }
}

impl ClosestContacts {
    pub fn new(target: Id, capacity: usize) -> Self {
        Self {
            target,
            capacity,
            contacts: Vec::with_capacity(capacity.min(200)),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn first(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.position(id).is_ok()
    }

    // === Public Methods ===

    /// Merge contacts into this list, keeping it sorted, deduplicated and
    /// truncated to its capacity.
    ///
    /// Merging contacts that are all already present is a no-op.
    pub fn merge<I: IntoIterator<Item = Contact>>(&mut self, contacts: I) -> Merge {
        let head_before = self.first().map(|contact| *contact.id());

        let mut added = 0;

        for contact in contacts {
            if let Err(position) = self.position(contact.id()) {
                self.contacts.insert(position, contact);
                added += 1;
            }
        }

        if added > 0 {
            self.contacts.truncate(self.capacity);
        }

        Merge {
            added,
            head_changed: self.first().map(|contact| *contact.id()) != head_before,
        }
    }

    pub fn into_contacts(self) -> Vec<Contact> {
        self.contacts
    }

    // === Private Methods ===

    /// XOR distances of distinct ids to the same target are distinct, so the
    /// search can only report `Ok` for a contact with the same id.
    fn position(&self, id: &Id) -> Result<usize, usize> {
        let seek = id.xor(&self.target);

        self.contacts
            .binary_search_by(|probe| probe.id().xor(&self.target).cmp(&seek))
    }
}

impl IntoIterator for ClosestContacts {
    type Item = Contact;
    type IntoIter = IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClosestContacts {
    type Item = &'a Contact;
    type IntoIter = Iter<'a, Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}
