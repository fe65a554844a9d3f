//! Kademlia node operations built on top of [Lookup].

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::common::{Contact, Id, NearestContacts};
use crate::config::Config;
use crate::lookup::{Lookup, LookupMode, LookupResult};
use crate::transport::Transport;
use crate::{Error, Result};

#[derive(Debug)]
/// A Kademlia node's lookup operations.
pub struct Kademlia<R, T: ?Sized> {
    id: Id,
    routing_table: R,
    lookup: Lookup<T>,
    hash_keys: bool,
}

impl<R: NearestContacts, T: Transport + ?Sized + 'static> Kademlia<R, T> {
    /// Create a node with Id `id`, seeding its lookups from `routing_table`
    /// and sending requests through `transport`.
    pub fn new(id: Id, routing_table: R, transport: Arc<T>, config: Config) -> Result<Self> {
        let lookup = Lookup::new(transport, &config)?.with_local_id(id);

        Ok(Kademlia {
            id,
            routing_table,
            lookup,
            hash_keys: config.hash_keys,
        })
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn routing_table(&self) -> &R {
        &self.routing_table
    }

    // === Public Methods ===

    /// Find the closest contacts to `target` in the network, sorted by distance.
    pub fn find_closest_contacts(&self, target: Id) -> Result<Vec<Contact>> {
        let result = self
            .lookup
            .run(target, LookupMode::FindNode, &self.routing_table)?;

        Ok(result.contacts().map(<[_]>::to_vec).unwrap_or_default())
    }

    /// Look for the value stored under `key`, returns `true` if some node has it.
    pub fn find_data(&self, key: &str) -> Result<bool> {
        Ok(self.get_data(key)?.is_some())
    }

    /// Look for the value stored under `key` and return it if some node has it.
    pub fn get_data(&self, key: &str) -> Result<Option<Bytes>> {
        let target = self.key_to_id(key)?;

        match self
            .lookup
            .run(target, LookupMode::FindData, &self.routing_table)?
        {
            LookupResult::Value { value, from } => {
                info!(key, ?target, ?from, size = value.len(), "Data located");

                Ok(Some(value))
            }
            LookupResult::Contacts(closest) => {
                info!(key, ?target, closest = closest.len(), "Data could not be located");

                Ok(None)
            }
        }
    }

    /// Locate the contacts closest to `key`, which are the ones that should store it.
    pub fn store_advertise(&self, key: &str) -> Result<Vec<Contact>> {
        let target = self.key_to_id(key)?;

        let contacts = self.find_closest_contacts(target)?;

        if contacts.is_empty() {
            return Err(Error::NoClosestContacts(target));
        }

        for contact in &contacts {
            debug!(key, ?target, ?contact, "Store candidate");
        }

        Ok(contacts)
    }

    // === Private Methods ===

    fn key_to_id(&self, key: &str) -> Result<Id> {
        if self.hash_keys {
            Ok(Id::from_key(key))
        } else {
            Id::from_str(key)
        }
    }
}
