//! Remote calls a lookup issues against other peers.

use bytes::Bytes;

use crate::common::{Contact, Id};

/// Blocking remote procedure calls used by lookup workers.
///
/// Implementations are responsible for their own request timeouts; a call
/// that didn't get a response in time should return [TransportError::Timeout].
pub trait Transport: Send + Sync {
    /// Ask `contact` for the contacts it knows closest to `target`.
    fn find_node(&self, contact: &Contact, target: &Id) -> Result<Vec<Contact>, TransportError>;

    /// Ask `contact` for the value stored under `target`, or the contacts it
    /// knows closest to `target` if it doesn't have it.
    fn find_data(&self, contact: &Contact, target: &Id)
        -> Result<FindDataResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
/// Successful response to a [Transport::find_data] call.
pub enum FindDataResponse {
    /// The remote peer holds the value.
    Value(Bytes),
    /// The remote peer doesn't hold the value, these are closer contacts instead.
    Contacts(Vec<Contact>),
}

#[derive(thiserror::Error, Debug, Clone)]
/// Failure of a single remote call.
pub enum TransportError {
    /// No response within the request timeout.
    #[error("Request to {0:?} timed out")]
    Timeout(Id),

    /// The remote peer could not be reached at all.
    #[error("Peer {0:?} is unreachable: {1}")]
    Unreachable(Id, String),

    /// The remote peer answered with something that isn't a valid response.
    #[error("Invalid response from {0:?}: {1}")]
    InvalidResponse(Id, String),
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn find_node(&self, contact: &Contact, target: &Id) -> Result<Vec<Contact>, TransportError> {
        (**self).find_node(contact, target)
    }

    fn find_data(
        &self,
        contact: &Contact,
        target: &Id,
    ) -> Result<FindDataResponse, TransportError> {
        (**self).find_data(contact, target)
    }
}
