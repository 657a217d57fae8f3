//! Transaction engine
//!
//! Nested `start_transaction`/`finish_transaction` pairs are counted and
//! coalesced; only the outermost finish commits. A commit runs in this order:
//!
//! 1. mutator listeners in rounds: the first round sees every change of the
//!    transaction, each later round only the changes made by the round
//!    before it, until a round changes nothing
//! 2. will-finish transaction listeners
//! 3. observer listeners, against the settled store
//! 4. did-finish transaction listeners
//!
//! Start-transaction listeners already ran when the transaction began.

use std::time::Instant;

use tabulon_core_types::TransactionId;

use super::changeset::{ChangeSet, ChangedPath};
use super::events::{Callback, StoreEvent, StoreListenerKind, TransactionInfo};
use super::{Store, TransactionChanges};
use crate::errors::{Result, StoreError};
use crate::listeners::{guarded, ListenerCategory, ListenerFailure, ListenerId};
use crate::model::Id;
use crate::{log_op_end, log_op_error, log_op_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Phase {
    #[default]
    Idle,
    InTransaction,
    Finishing,
}

#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    pub(crate) depth: usize,
    pub(crate) phase: Phase,
    pub(crate) id: Option<TransactionId>,
    /// Everything since the transaction began
    pub(crate) pending: ChangeSet,
    /// Everything since the current mutator round began
    pub(crate) round: ChangeSet,
    pub(crate) started: Option<Instant>,
}

impl Store {
    /// Begin a transaction, or nest inside the open one
    pub fn start_transaction(&mut self) {
        if self.tx.depth > 0 {
            self.tx.depth += 1;
            return;
        }
        let id = TransactionId::new();
        log_op_start!(
            "commit",
            tx_id = id.as_str(),
            store_id = self.id.as_str()
        );
        self.tx.id = Some(id);
        self.tx.depth = 1;
        self.tx.phase = Phase::InTransaction;
        self.tx.started = Some(Instant::now());
        self.fire_transaction_listeners(StoreListenerKind::StartTransaction);
    }

    /// End the innermost open transaction, committing if it is the outermost
    ///
    /// Calling this with no open transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns `MutatorOverflow` if mutator listeners were still changing the
    /// store after `max_mutator_rounds` rounds. The changes already applied
    /// stay and are still delivered to observer and did-finish listeners.
    pub fn finish_transaction(&mut self) -> Result<()> {
        match self.tx.depth {
            0 => Ok(()),
            1 if self.tx.phase == Phase::Finishing => Ok(()),
            1 => self.commit(),
            _ => {
                self.tx.depth -= 1;
                Ok(())
            }
        }
    }

    /// Run `f` inside one transaction
    ///
    /// # Errors
    ///
    /// Returns the commit error if this is the outermost transaction and
    /// committing fails.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Store) -> T) -> Result<T> {
        self.start_transaction();
        let value = f(self);
        self.finish_transaction()?;
        Ok(value)
    }

    /// Check if a transaction is open
    pub fn is_in_transaction(&self) -> bool {
        self.tx.depth > 0
    }

    /// Id of the open transaction
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.tx.id.as_ref()
    }

    /// Net changes of the transaction in progress
    pub fn transaction_changes(&self) -> TransactionChanges<'_> {
        TransactionChanges::new(&self.tx.pending)
    }

    /// Run a fallible mutation inside a transaction
    ///
    /// The mutation's own error wins over a commit error.
    pub(crate) fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.start_transaction();
        let result = f(self);
        let finished = self.finish_transaction();
        let value = result?;
        finished?;
        Ok(value)
    }

    fn commit(&mut self) -> Result<()> {
        self.tx.phase = Phase::Finishing;
        let tx_id = self
            .tx
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();

        let result = self.run_mutators();
        let duration_ms = self
            .tx
            .started
            .map_or(0, |started| started.elapsed().as_millis() as u64);

        // Writes made before an overflow stay applied, so every listener still
        // sees the net change set before the error is returned.
        self.fire_transaction_listeners(StoreListenerKind::WillFinishTransaction);
        let events = self.pending_events();
        self.dispatch(events, Some(false));
        self.fire_transaction_listeners(StoreListenerKind::DidFinishTransaction);

        match &result {
            Ok(rounds) => {
                log_op_end!(
                    "commit",
                    duration_ms = duration_ms,
                    tx_id = tx_id.as_str(),
                    changed_cells = self.tx.pending.cells_changed(),
                    changed_values = self.tx.pending.values_changed(),
                    mutator_rounds = *rounds
                );
            }
            Err(err) => {
                log_op_error!(
                    "commit",
                    err.clone(),
                    duration_ms = duration_ms,
                    tx_id = tx_id.as_str()
                );
            }
        }

        self.tx = TransactionState::default();
        result.map(|_| ())
    }

    /// Run mutator rounds until one makes no net change
    fn run_mutators(&mut self) -> Result<usize> {
        let mut round_set = std::mem::take(&mut self.tx.round);
        if !self.listeners.has_mutators() {
            return Ok(0);
        }
        let mut rounds = 0;
        loop {
            let events = round_set.events(&self.tables, &self.values, &self.cell_id_counts);
            if events.is_empty() {
                return Ok(rounds);
            }
            if rounds >= self.config.max_mutator_rounds {
                return Err(StoreError::MutatorOverflow {
                    rounds,
                    transaction_id: self
                        .tx
                        .id
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                });
            }
            rounds += 1;
            self.dispatch(events, Some(true));
            round_set = std::mem::take(&mut self.tx.round);
        }
    }

    fn pending_events(&self) -> Vec<ChangedPath> {
        self.tx
            .pending
            .events(&self.tables, &self.values, &self.cell_id_counts)
    }

    fn fire_transaction_listeners(&mut self, kind: StoreListenerKind) {
        if !self.listeners.has_listeners(kind) {
            return;
        }
        let Some(id) = self.tx.id.clone() else {
            return;
        };
        let info = TransactionInfo {
            id,
            depth: self.tx.depth,
            cells_changed: self.tx.pending.cells_changed(),
            values_changed: self.tx.pending.values_changed(),
        };
        self.dispatch(
            vec![(kind, Vec::<Id>::new(), StoreEvent::Transaction(info))],
            None,
        );
    }

    /// Invoke the listeners matching `events`, isolating each callback
    pub(crate) fn dispatch(&mut self, events: Vec<ChangedPath>, mutators: Option<bool>) {
        if events.is_empty() {
            return;
        }
        let notifications = self.listeners.notify(events, mutators);
        for notification in notifications {
            // deleted by an earlier callback in this batch
            if !self.listeners.contains(notification.id) {
                continue;
            }
            let event = &notification.event;
            let outcome = match &notification.callback {
                Callback::Observe(cb) => match cb.try_borrow_mut() {
                    Ok(mut f) => {
                        let store: &Store = self;
                        guarded(|| (*f)(store, event))
                    }
                    Err(_) => Err("listener is already running".to_string()),
                },
                Callback::Mutate(cb) => match cb.try_borrow_mut() {
                    Ok(mut f) => guarded(|| (*f)(self, event)),
                    Err(_) => Err("listener is already running".to_string()),
                },
            };
            if let Err(message) = outcome {
                self.report_failure(notification.id, notification.category, message);
            }
        }
    }

    fn report_failure(&self, listener_id: ListenerId, category: StoreListenerKind, message: String) {
        self.sink.listener_failed(&ListenerFailure {
            listener_id,
            category: category.name(),
            message,
            transaction_id: self.tx.id.clone(),
        });
    }
}
