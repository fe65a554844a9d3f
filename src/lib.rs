#![doc = include_str!("../README.md")]

// Modules
mod common;
mod config;
mod error;
mod kademlia;
pub mod lookup;
mod testnet;
pub mod transport;

pub use crate::common::{
    Contact, Id, KBucket, NearestContacts, RoutingTable, ID_SIZE, MAX_BUCKET_SIZE_K,
};
pub use bytes::Bytes;
pub use config::{Config, DEFAULT_ALPHA, DEFAULT_CONVERGENCE_THRESHOLD};
pub use error::{Error, Result};
pub use kademlia::Kademlia;
pub use lookup::{Lookup, LookupMode, LookupResult};
pub use testnet::Testnet;
pub use transport::{FindDataResponse, Transport, TransportError};
