//! In-process simulated network, for tests and demos.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::common::{Contact, Id, RoutingTable, MAX_BUCKET_SIZE_K};
use crate::config::Config;
use crate::kademlia::Kademlia;
use crate::lookup::ClosestContacts;
use crate::transport::{FindDataResponse, Transport, TransportError};
use crate::{Error, Result};

const LOOPBACK: u32 = 0x7f00_0001;
const PORT: u16 = 6881;

#[derive(Debug)]
/// A network of simulated nodes answering [Transport] calls in process.
///
/// Each node has its own [RoutingTable] populated with every other node it
/// has room for, so lookups have to hop through the network like they would
/// over a real one.
pub struct Testnet {
    contacts: Vec<Contact>,
    routing_tables: HashMap<Id, RoutingTable>,
    values: HashMap<Id, HashMap<Id, Bytes>>,
    unresponsive: HashSet<Id>,
    latency: Duration,
    requests: AtomicUsize,
}

impl Testnet {
    /// Create a network of `size` nodes with random Ids.
    pub fn new(size: usize) -> Testnet {
        let contacts = local_contacts(size);

        let routing_tables = contacts
            .iter()
            .map(|contact| {
                let mut table = RoutingTable::new(*contact.id());

                for other in &contacts {
                    table.add(*other);
                }

                (*contact.id(), table)
            })
            .collect();

        Testnet {
            contacts,
            routing_tables,
            values: HashMap::new(),
            unresponsive: HashSet::new(),
            latency: Duration::ZERO,
            requests: AtomicUsize::new(0),
        }
    }

    // === Options ===

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    // === Getters ===

    /// Contacts of all the nodes in this network.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// The routing table of the node with this [Id].
    pub fn routing_table(&self, id: &Id) -> Option<&RoutingTable> {
        self.routing_tables.get(id)
    }

    /// Brute force the `limit` closest nodes to `target`.
    pub fn closest(&self, target: &Id, limit: usize) -> Vec<Contact> {
        let mut closest = ClosestContacts::new(*target, limit);
        closest.merge(self.contacts.iter().copied());

        closest.into_contacts()
    }

    /// Number of requests answered (or timed out) so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    // === Public Methods ===

    /// Store `value` under `key` at the node with Id `at`.
    pub fn store(&mut self, at: &Id, key: Id, value: Bytes) {
        self.values.entry(*at).or_default().insert(key, value);
    }

    /// Make the node with Id `id` time out on every request.
    pub fn set_unresponsive(&mut self, id: &Id) {
        self.unresponsive.insert(*id);
    }

    /// Create a [Kademlia] node acting as the `index`th node of this network.
    ///
    /// Returns [Error::UnknownNode] if `index` is out of bounds.
    pub fn kademlia(
        self: &Arc<Self>,
        index: usize,
        config: Config,
    ) -> Result<Kademlia<RoutingTable, Testnet>> {
        let contact = *self
            .contacts
            .get(index)
            .ok_or(Error::UnknownNode(index))?;

        let routing_table = self
            .routing_tables
            .get(contact.id())
            .cloned()
            .unwrap_or_else(|| RoutingTable::new(*contact.id()));

        Kademlia::new(*contact.id(), routing_table, self.clone(), config)
    }

    /// Create a [Kademlia] node that isn't part of this network, bootstrapped
    /// with `bootstrap` of its nodes.
    pub fn outsider(
        self: &Arc<Self>,
        bootstrap: usize,
        config: Config,
    ) -> Result<Kademlia<RoutingTable, Testnet>> {
        let id = Id::random();
        let mut routing_table = RoutingTable::new(id);

        for contact in self.contacts.iter().take(bootstrap) {
            routing_table.add(*contact);
        }

        Kademlia::new(id, routing_table, self.clone(), config)
    }

    // === Private Methods ===

    fn respond(&self, contact: &Contact) -> Result<&RoutingTable, TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if self.unresponsive.contains(contact.id()) {
            trace!(?contact, "Simulated timeout");

            return Err(TransportError::Timeout(*contact.id()));
        }

        self.routing_tables.get(contact.id()).ok_or_else(|| {
            TransportError::Unreachable(*contact.id(), "not part of the testnet".to_string())
        })
    }
}

/// Contacts with random Ids, each at its own loopback address.
fn local_contacts(size: usize) -> Vec<Contact> {
    (0..size)
        .map(|i| {
            let ip = Ipv4Addr::from(LOOPBACK.wrapping_add(i as u32));

            Contact::new(Id::random(), SocketAddrV4::new(ip, PORT).into())
        })
        .collect()
}

impl Transport for Testnet {
    fn find_node(
        &self,
        contact: &Contact,
        target: &Id,
    ) -> Result<Vec<Contact>, TransportError> {
        let routing_table = self.respond(contact)?;

        Ok(routing_table.closest(target, MAX_BUCKET_SIZE_K))
    }

    fn find_data(
        &self,
        contact: &Contact,
        target: &Id,
    ) -> Result<FindDataResponse, TransportError> {
        let routing_table = self.respond(contact)?;

        if let Some(value) = self
            .values
            .get(contact.id())
            .and_then(|values| values.get(target))
        {
            return Ok(FindDataResponse::Value(value.clone()));
        }

        Ok(FindDataResponse::Contacts(
            routing_table.closest(target, MAX_BUCKET_SIZE_K),
        ))
    }
}
