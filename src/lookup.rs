//! Iterative lookup of the closest contacts to a target, or the data stored under it.

mod closest;
mod state;
mod worker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flume::RecvTimeoutError;
use tracing::{debug, warn};

use crate::common::{Contact, Id, NearestContacts};
use crate::config::Config;
use crate::transport::Transport;
use crate::{Error, Result};

pub use closest::{ClosestContacts, Merge};

use state::{LookupState, Progress};
use worker::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which remote call a lookup issues.
pub enum LookupMode {
    /// Find the closest contacts to the target.
    FindNode,
    /// Find the value stored under the target, or the closest contacts to it.
    FindData,
}

#[derive(Debug, Clone, Copy)]
/// Request for a worker to query one contact.
pub struct LookupOrder {
    pub mode: LookupMode,
    pub contact: Contact,
    pub target: Id,
}

#[derive(Debug, Clone, PartialEq)]
/// The single result of a lookup.
pub enum LookupResult {
    /// Closest contacts to the target, sorted by distance.
    Contacts(Vec<Contact>),
    /// The value stored under the target, and the contact that returned it.
    Value { value: Bytes, from: Contact },
}

impl LookupResult {
    /// Returns the closest contacts, or None if a value was found.
    pub fn contacts(&self) -> Option<&[Contact]> {
        match self {
            LookupResult::Contacts(contacts) => Some(contacts),
            LookupResult::Value { .. } => None,
        }
    }

    /// Returns the found value if any.
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            LookupResult::Contacts(_) => None,
            LookupResult::Value { value, .. } => Some(value),
        }
    }
}

/// An iterative process of concurrently sending requests to the closest known
/// contacts to a target, merging the closer contacts they return, and repeating
/// until no closer contacts show up for a while or everyone was asked.
///
/// Each call to [Lookup::run] owns its own state and worker threads, which
/// don't outlive the lookup (apart from finishing an already inflight request).
#[derive(Debug)]
pub struct Lookup<T: ?Sized> {
    transport: Arc<T>,
    alpha: usize,
    k: usize,
    convergence_threshold: usize,
    timeout: Option<Duration>,
    local_id: Option<Id>,
}

impl<T: Transport + ?Sized + 'static> Lookup<T> {
    /// Create a new lookup engine, returns an error if `config` is invalid.
    pub fn new(transport: Arc<T>, config: &Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            alpha: config.alpha,
            k: config.k,
            convergence_threshold: config.convergence_threshold,
            timeout: config.lookup_timeout,
            local_id: None,
        })
    }

    // === Options ===

    /// Ignore contacts with this [Id], usually the id of the node running the lookup.
    pub fn with_local_id(mut self, id: Id) -> Self {
        self.local_id = Some(id);
        self
    }

    // === Public Methods ===

    /// Run a lookup for `target`, seeded with the closest contacts `routing_table` knows.
    ///
    /// Blocks until exactly one result is available.
    pub fn run<R: NearestContacts + ?Sized>(
        &self,
        target: Id,
        mode: LookupMode,
        routing_table: &R,
    ) -> Result<LookupResult> {
        let mut state = LookupState::new(target, mode, self.k, self.convergence_threshold);
        if let Some(id) = self.local_id {
            state = state.with_local_id(id);
        }

        state.seed(routing_table.nearest_contacts(&target, self.k));

        let orders = state.start(self.alpha);

        if orders.is_empty() {
            warn!(?target, "No contacts to query");

            return Ok(LookupResult::Contacts(Vec::new()));
        }

        debug!(
            ?target,
            ?mode,
            candidates = state.closest().len(),
            workers = orders.len(),
            "Starting lookup"
        );

        let (order_sender, order_receiver) = flume::bounded::<LookupOrder>(self.alpha);
        let (report_sender, report_receiver) = flume::bounded::<Report>(self.alpha);

        for index in 0..orders.len() {
            worker::spawn(
                index,
                self.transport.clone(),
                order_receiver.clone(),
                report_sender.clone(),
            )?;
        }

        // Only workers hold these, so the coordinator notices if they all die.
        drop(report_sender);
        drop(order_receiver);

        // Inflight orders never exceed alpha, so neither channel ever fills up.
        for order in orders {
            order_sender
                .send(order)
                .map_err(|_| Error::WorkerPoolClosed)?;
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let report = match deadline {
                Some(deadline) => {
                    report_receiver
                        .recv_deadline(deadline)
                        .map_err(|error| match error {
                            RecvTimeoutError::Timeout => Error::LookupTimeout(target),
                            RecvTimeoutError::Disconnected => Error::WorkerPoolClosed,
                        })?
                }
                None => report_receiver
                    .recv()
                    .map_err(|_| Error::WorkerPoolClosed)?,
            };

            match state.on_outcome(report.contact, report.outcome) {
                Progress::Continue(Some(order)) => order_sender
                    .send(order)
                    .map_err(|_| Error::WorkerPoolClosed)?,
                Progress::Continue(None) => {}
                Progress::Done(result) => {
                    debug!(
                        ?target,
                        asked = state.asked().len(),
                        completed = state.completed().len(),
                        stale_rounds = state.stale_rounds(),
                        found_value = result.value().is_some(),
                        "Done lookup"
                    );

                    // Dropping the order sender on return stops the workers.
                    return Ok(result);
                }
            }
        }
    }
}
