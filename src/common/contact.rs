//! Struct and implementation of a reachable peer in the Kademlia network.
use std::{
    hash::{Hash, Hasher},
    net::{SocketAddr, SocketAddrV4},
};

use crate::common::Id;

#[derive(Debug, Clone, Copy)]
/// A peer's [Id] and the address it can be reached at.
///
/// Two contacts are equal if they share the same [Id], regardless of their address.
pub struct Contact {
    id: Id,
    address: SocketAddr,
}

impl Contact {
    /// Creates a new Contact from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Contact {
        Contact { id, address }
    }

    /// Creates a contact with a random id, listening on a random local port.
    pub fn random() -> Contact {
        Contact {
            id: Id::random(),
            address: SocketAddrV4::new([127, 0, 0, 1].into(), rand::random()).into(),
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
