//! Query workers: threads executing blocking remote calls for a lookup.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use tracing::{trace, warn};

use super::state::Outcome;
use super::{LookupMode, LookupOrder};
use crate::common::Contact;
use crate::transport::{FindDataResponse, Transport, TransportError};

/// Outcome of one [LookupOrder], sent back to the coordinator.
#[derive(Debug)]
pub(crate) struct Report {
    pub contact: Contact,
    pub outcome: Outcome,
}

/// Spawn a worker executing orders until the order queue is closed, or the
/// coordinator stopped listening for reports.
pub(crate) fn spawn<T: Transport + ?Sized + 'static>(
    index: usize,
    transport: Arc<T>,
    orders: Receiver<LookupOrder>,
    reports: Sender<Report>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("lookup worker {index}"))
        .spawn(move || run(index, &*transport, orders, reports))
}

fn run<T: Transport + ?Sized>(
    index: usize,
    transport: &T,
    orders: Receiver<LookupOrder>,
    reports: Sender<Report>,
) {
    trace!(index, "Lookup worker started");

    for order in orders.iter() {
        if orders.is_disconnected() {
            // Lookup is already done, skip the remaining queued orders.
            break;
        }

        trace!(index, ?order, "Executing order");

        // A panicking transport call counts as a failed one, otherwise its
        // order would never complete and the lookup could never finish.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(transport, &order)))
            .unwrap_or_else(|_| {
                warn!(index, contact = ?order.contact, "Transport panicked");

                Outcome::Failed(TransportError::Unreachable(
                    *order.contact.id(),
                    "transport panicked".to_string(),
                ))
            });

        let report = Report {
            contact: order.contact,
            outcome,
        };

        if reports.send(report).is_err() {
            // Lookup is already done.
            break;
        }
    }

    trace!(index, "Lookup worker stopped");
}

fn execute<T: Transport + ?Sized>(transport: &T, order: &LookupOrder) -> Outcome {
    match order.mode {
        LookupMode::FindNode => match transport.find_node(&order.contact, &order.target) {
            Ok(contacts) => Outcome::Contacts(contacts),
            Err(error) => Outcome::Failed(error),
        },
        LookupMode::FindData => match transport.find_data(&order.contact, &order.target) {
            Ok(FindDataResponse::Value(value)) => Outcome::Value(value),
            Ok(FindDataResponse::Contacts(contacts)) => Outcome::Contacts(contacts),
            Err(error) => Outcome::Failed(error),
        },
    }
}
