//! Convergence state of a single lookup.
//!
//! Only ever touched by the lookup's coordinating thread, workers report
//! [Outcome]s and get [LookupOrder]s back, so every step below runs serially.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{ClosestContacts, LookupMode, LookupOrder, LookupResult};
use crate::common::{Contact, Id};
use crate::transport::TransportError;

/// What a worker observed executing one [LookupOrder].
#[derive(Debug)]
pub(crate) enum Outcome {
    Contacts(Vec<Contact>),
    Value(Bytes),
    Failed(TransportError),
}

/// What the coordinator should do after feeding an [Outcome] to the state.
#[derive(Debug)]
pub(crate) enum Progress {
    /// Keep waiting for outcomes, after dispatching this order if any.
    Continue(Option<LookupOrder>),
    /// The lookup is over.
    Done(LookupResult),
}

#[derive(Debug)]
pub(crate) struct LookupState {
    mode: LookupMode,
    closest: ClosestContacts,
    /// Contacts an order was dispatched for.
    asked: HashSet<Id>,
    /// Contacts whose order came back, successfully or not.
    completed: HashSet<Id>,
    /// Consecutive responses that didn't surface a closer contact.
    stale_rounds: usize,
    convergence_threshold: usize,
    local_id: Option<Id>,
    finished: bool,
}

impl LookupState {
    pub fn new(target: Id, mode: LookupMode, k: usize, convergence_threshold: usize) -> Self {
        Self {
            mode,
            closest: ClosestContacts::new(target, k),
            asked: HashSet::new(),
            completed: HashSet::new(),
            stale_rounds: 0,
            convergence_threshold,
            local_id: None,
            finished: false,
        }
    }

    /// Never merge contacts carrying this id, so a node doesn't query itself.
    pub fn with_local_id(mut self, id: Id) -> Self {
        self.local_id = Some(id);
        self
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.closest.target()
    }

    pub fn closest(&self) -> &ClosestContacts {
        &self.closest
    }

    pub fn stale_rounds(&self) -> usize {
        self.stale_rounds
    }

    pub fn asked(&self) -> &HashSet<Id> {
        &self.asked
    }

    pub fn completed(&self) -> &HashSet<Id> {
        &self.completed
    }

    // === Public Methods ===

    /// Seed the candidates, usually from the routing table.
    pub fn seed(&mut self, contacts: Vec<Contact>) {
        let contacts = self.without_local(contacts);
        self.closest.merge(contacts);
    }

    /// Orders for the first `alpha` closest contacts.
    ///
    /// Returns an empty list only if there are no candidates at all.
    pub fn start(&mut self, alpha: usize) -> Vec<LookupOrder> {
        let mut orders = Vec::with_capacity(alpha.min(self.closest.len()));

        while orders.len() < alpha {
            match self.next_order() {
                Some(order) => orders.push(order),
                None => break,
            }
        }

        orders
    }

    /// Feed the outcome of the order dispatched to `from`.
    pub fn on_outcome(&mut self, from: Contact, outcome: Outcome) -> Progress {
        debug_assert!(!self.finished, "outcome fed to a finished lookup");
        debug_assert!(self.asked.contains(from.id()), "outcome from an unasked contact");

        let dispatch = match outcome {
            Outcome::Value(value) => {
                debug!(id = ?self.target(), ?from, "Found value");

                self.completed.insert(*from.id());
                return self.finish(LookupResult::Value { value, from });
            }
            Outcome::Contacts(contacts) => {
                let converged = self.merge_and_decide(contacts);

                if converged {
                    debug!(
                        id = ?self.target(),
                        stale_rounds = self.stale_rounds,
                        "Lookup converged"
                    );

                    self.completed.insert(*from.id());
                    return self.finish_with_closest();
                }

                self.next_order()
            }
            Outcome::Failed(error) => {
                trace!(?from, ?error, "Lookup request failed");

                self.next_order()
            }
        };

        self.completed.insert(*from.id());

        if self.is_exhausted() {
            debug!(
                id = ?self.target(),
                asked = self.asked.len(),
                "Asked all closest contacts"
            );

            return self.finish_with_closest();
        }

        Progress::Continue(dispatch)
    }

    /// Every closest contact was asked and every asked contact responded or failed.
    pub fn is_exhausted(&self) -> bool {
        self.closest
            .contacts()
            .iter()
            .all(|contact| self.asked.contains(contact.id()))
            && self.completed.len() == self.asked.len()
    }

    /// Finish the lookup with the current closest contacts.
    pub fn finish_with_closest(&mut self) -> Progress {
        let contacts = self.closest.contacts().to_vec();

        self.finish(LookupResult::Contacts(contacts))
    }

    // === Private Methods ===

    /// Merge a peer's contacts, and return `true` if the lookup converged.
    fn merge_and_decide(&mut self, contacts: Vec<Contact>) -> bool {
        let contacts = self.without_local(contacts);

        if contacts.is_empty() {
            trace!(id = ?self.target(), "No contacts returned");

            self.stale_rounds += 1;
        } else {
            let merge = self.closest.merge(contacts);

            trace!(
                id = ?self.target(),
                added = merge.added,
                head_changed = merge.head_changed,
                "Merged contacts"
            );

            if merge.improved() {
                self.stale_rounds = 0;
            } else {
                self.stale_rounds += 1;
            }
        }

        self.stale_rounds > self.convergence_threshold
    }

    /// The closest contact that wasn't asked yet, marked as asked.
    fn next_order(&mut self) -> Option<LookupOrder> {
        let asked = &self.asked;

        let contact = *self
            .closest
            .contacts()
            .iter()
            .find(|contact| !asked.contains(contact.id()))?;

        self.asked.insert(*contact.id());

        Some(LookupOrder {
            mode: self.mode,
            contact,
            target: self.target(),
        })
    }

    fn without_local(&self, mut contacts: Vec<Contact>) -> Vec<Contact> {
        if let Some(local_id) = self.local_id {
            contacts.retain(|contact| contact.id() != &local_id);
        }

        contacts
    }

    fn finish(&mut self, result: LookupResult) -> Progress {
        self.finished = true;

        Progress::Done(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn contact(last_byte: u8) -> Contact {
        let mut bytes = [0; 20];
        bytes[19] = last_byte;

        Contact::new(Id::from(bytes), "127.0.0.1:6881".parse().unwrap())
    }

    fn target() -> Id {
        Id::from([0; 20])
    }

    fn state(k: usize, threshold: usize, seed: Vec<Contact>) -> LookupState {
        let mut state = LookupState::new(target(), LookupMode::FindNode, k, threshold);
        state.seed(seed);
        state
    }

    fn timeout(contact: &Contact) -> Outcome {
        Outcome::Failed(TransportError::Timeout(*contact.id()))
    }

    #[test]
    fn seed_is_sorted_and_truncated() {
        let state = state(3, 3, vec![contact(9), contact(4), contact(7), contact(1), contact(4)]);

        assert_eq!(
            state.closest().contacts(),
            &[contact(1), contact(4), contact(7)]
        );
    }

    #[test]
    fn start_dispatches_at_most_alpha_in_distance_order() {
        let mut state = state(20, 3, vec![contact(5), contact(2), contact(8), contact(1)]);

        let orders = state.start(3);
        let contacts = orders.iter().map(|o| o.contact).collect::<Vec<_>>();

        assert_eq!(contacts, vec![contact(1), contact(2), contact(5)]);
        assert_eq!(state.asked().len(), 3);
        assert!(state.completed().is_empty());
    }

    #[test]
    fn empty_seed_is_exhausted() {
        let mut state = state(20, 3, vec![]);

        assert!(state.start(3).is_empty());
        assert!(state.is_exhausted());

        match state.finish_with_closest() {
            Progress::Done(LookupResult::Contacts(contacts)) => assert!(contacts.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_contact_answering_nothing() {
        let a = contact(1);
        let mut state = state(20, 3, vec![a]);

        let orders = state.start(3);
        assert_eq!(orders.len(), 1);

        match state.on_outcome(a, Outcome::Contacts(vec![])) {
            Progress::Done(LookupResult::Contacts(contacts)) => assert_eq!(contacts, vec![a]),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(state.stale_rounds(), 1);
    }

    #[test]
    fn converges_after_threshold_stale_rounds() {
        let seed = (1..=10).map(contact).collect::<Vec<_>>();
        let mut state = state(20, 3, seed.clone());

        let mut inflight = state.start(3);
        let mut completed = 0;

        loop {
            let order = inflight.remove(0);
            completed += 1;

            match state.on_outcome(order.contact, Outcome::Contacts(vec![])) {
                Progress::Continue(next) => {
                    inflight.extend(next);
                }
                Progress::Done(LookupResult::Contacts(contacts)) => {
                    assert_eq!(contacts, seed);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        // 1 + 3 stale rounds, the 4th exceeds the threshold.
        assert_eq!(completed, 4);
        assert_eq!(state.stale_rounds(), 4);
        assert_eq!(state.asked().len(), 6);
    }

    #[test]
    fn exhaustion_before_convergence() {
        let a = contact(1);
        let b = contact(2);
        let mut state = state(20, 5, vec![a, b]);

        assert_eq!(state.start(3).len(), 2);

        assert!(matches!(
            state.on_outcome(b, Outcome::Contacts(vec![])),
            Progress::Continue(None)
        ));

        match state.on_outcome(a, Outcome::Contacts(vec![])) {
            Progress::Done(LookupResult::Contacts(contacts)) => assert_eq!(contacts, vec![a, b]),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(state.stale_rounds(), 2);
    }

    #[test]
    fn all_timeouts_return_sorted_seed() {
        let seed = vec![contact(3), contact(1), contact(2)];
        let mut state = state(20, 0, seed);

        let mut inflight = state.start(2);
        assert_eq!(inflight.len(), 2);

        let result = loop {
            let order = inflight.remove(0);

            match state.on_outcome(order.contact, timeout(&order.contact)) {
                Progress::Continue(next) => inflight.extend(next),
                Progress::Done(result) => break result,
            }
        };

        match result {
            LookupResult::Contacts(contacts) => {
                assert_eq!(contacts, vec![contact(1), contact(2), contact(3)])
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(state.stale_rounds(), 0);
        assert_eq!(state.completed().len(), 3);
    }

    #[test]
    fn closer_contact_resets_stale_rounds() {
        let far = contact(200);
        let mut state = state(20, 3, vec![far, contact(201), contact(202)]);
        state.start(1);

        assert!(matches!(
            state.on_outcome(far, Outcome::Contacts(vec![contact(203)])),
            Progress::Continue(Some(_))
        ));
        assert_eq!(state.stale_rounds(), 1);

        let order = match state.on_outcome(
            contact(201),
            Outcome::Contacts(vec![contact(1), contact(204)]),
        ) {
            Progress::Continue(Some(order)) => order,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(state.stale_rounds(), 0);
        assert_eq!(order.contact, contact(1));
        assert_eq!(state.closest().first(), Some(&contact(1)));
    }

    #[test]
    fn known_contacts_and_timeouts_do_not_reset_stale_rounds() {
        let a = contact(1);
        let b = contact(2);
        let c = contact(3);
        let mut state = state(20, 10, vec![a, b, c]);
        state.start(3);

        state.on_outcome(a, Outcome::Contacts(vec![b, c]));
        assert_eq!(state.stale_rounds(), 1);

        state.on_outcome(b, timeout(&b));
        assert_eq!(state.stale_rounds(), 1);

        assert_eq!(
            state.closest().contacts(),
            &[a, b, c],
            "merging known contacts keeps the same order"
        );
    }

    #[test]
    fn never_dispatches_twice() {
        let seed = (1..=5).map(contact).collect::<Vec<_>>();
        let mut state = state(20, 100, seed.clone());

        let mut inflight = state.start(3);
        let mut dispatched = inflight.iter().map(|o| o.contact).collect::<Vec<_>>();

        while !inflight.is_empty() {
            let order = inflight.remove(0);

            // Every peer keeps pointing at the whole seed again.
            match state.on_outcome(order.contact, Outcome::Contacts(seed.clone())) {
                Progress::Continue(next) => {
                    dispatched.extend(next.iter().map(|o| o.contact));
                    inflight.extend(next);
                }
                Progress::Done(_) => break,
            }
        }

        let unique = dispatched.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), dispatched.len());
        assert_eq!(dispatched.len(), 5);
    }

    #[test]
    fn value_finishes_immediately() {
        let a = contact(1);
        let b = contact(2);
        let mut state = LookupState::new(target(), LookupMode::FindData, 20, 3);
        state.seed(vec![a, b]);
        state.start(3);

        match state.on_outcome(b, Outcome::Value(Bytes::from_static(b"file"))) {
            Progress::Done(LookupResult::Value { value, from }) => {
                assert_eq!(value, Bytes::from_static(b"file"));
                assert_eq!(from, b);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ignores_local_id() {
        let local = contact(1);
        let mut state = LookupState::new(target(), LookupMode::FindNode, 20, 3)
            .with_local_id(*local.id());
        state.seed(vec![local, contact(2)]);

        assert_eq!(state.closest().contacts(), &[contact(2)]);

        state.start(1);

        // A response only pointing back at us counts as an empty one.
        match state.on_outcome(contact(2), Outcome::Contacts(vec![local])) {
            Progress::Done(LookupResult::Contacts(contacts)) => {
                assert_eq!(contacts, vec![contact(2)])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(state.stale_rounds(), 1);
    }

    #[test]
    fn truncated_contacts_count_toward_exhaustion() {
        let mut state = state(2, 10, vec![contact(10), contact(11)]);
        state.start(1);

        // Two closer contacts push the asked contact out of the closest list.
        state.on_outcome(contact(10), Outcome::Contacts(vec![contact(1), contact(2)]));

        assert_eq!(state.closest().contacts(), &[contact(1), contact(2)]);
        assert!(state.asked().contains(contact(10).id()));
        assert!(state.closest().len() <= 2);
    }
}
