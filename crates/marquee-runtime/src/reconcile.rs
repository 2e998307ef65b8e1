//! Optimistic remote list and rating updates with rollback.
//!
//! Each [`SyncSlot`] runs its own state machine:
//!
//! ```text
//! Idle ──request──▶ Pending ──ok──▶ Confirmed ──observe──▶ Idle
//!                           └─err─▶ RolledBack ──observe──▶ Idle
//! ```
//!
//! The local value flips as soon as a request is accepted. At most one remote
//! call is in flight per slot; a second request while `Pending` is refused
//! with [`Busy`] and nothing is dispatched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use marquee_api::traits::{AccountListService, ListRef, MediaRef, RatingTarget};
use marquee_api::SyncError;

const EVENT_CAPACITY: usize = 64;

/// One independently synchronised piece of remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncSlot {
    Membership { item: MediaRef, list: ListRef },
    Rating(RatingTarget),
}

impl SyncSlot {
    /// Value assumed before anything is known about the slot.
    fn initial_value(&self) -> SlotValue {
        match self {
            Self::Membership { .. } => SlotValue::Included(false),
            Self::Rating(_) => SlotValue::Rating(None),
        }
    }
}

impl std::fmt::Display for SyncSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Membership { item, list } => write!(f, "{item} in {list}"),
            Self::Rating(target) => write!(f, "rating of {target}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    Included(bool),
    Rating(Option<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncPhase {
    Idle,
    /// `previous` is restored if the remote call fails.
    Pending { previous: SlotValue },
    Confirmed,
    RolledBack(SyncError),
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::RolledBack(_))
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Confirmed(SlotValue),
    RolledBack {
        failure: SyncError,
        restored: SlotValue,
    },
}

/// State transitions, for views that show a toggle.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Pending {
        slot: SyncSlot,
        value: SlotValue,
    },
    Confirmed {
        slot: SyncSlot,
        value: SlotValue,
    },
    RolledBack {
        slot: SyncSlot,
        failure: SyncError,
        restored: SlotValue,
    },
}

impl SyncEvent {
    pub fn slot(&self) -> SyncSlot {
        match self {
            Self::Pending { slot, .. } | Self::Confirmed { slot, .. } | Self::RolledBack { slot, .. } => {
                *slot
            }
        }
    }

    /// The credential was rejected: prompt for a new one instead of retrying.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::RolledBack { failure, .. } if failure.is_auth())
    }
}

/// A request was refused because the slot already has one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a remote update for {0} is already in flight")]
pub struct Busy(pub SyncSlot);

#[derive(Default)]
struct SlotTable {
    values: HashMap<SyncSlot, SlotValue>,
    phases: HashMap<SyncSlot, SyncPhase>,
}

struct Shared {
    table: Mutex<SlotTable>,
    events: broadcast::Sender<SyncEvent>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    /// `Idle`/terminal → `Pending`, applying `value` locally.
    fn begin(&self, slot: SyncSlot, value: SlotValue) -> Result<(), Busy> {
        let mut table = self.table();
        if matches!(table.phases.get(&slot), Some(SyncPhase::Pending { .. })) {
            tracing::debug!(%slot, "Rejected request, update already in flight");
            return Err(Busy(slot));
        }
        let previous = table
            .values
            .insert(slot, value)
            .unwrap_or_else(|| slot.initial_value());
        table.phases.insert(slot, SyncPhase::Pending { previous });
        drop(table);

        tracing::debug!(%slot, ?value, ?previous, "Applied optimistic update");
        self.emit(SyncEvent::Pending { slot, value });
        Ok(())
    }

    /// `Pending` → `Confirmed` or `RolledBack`. A slot that already left
    /// `Pending` is not touched again; its recorded outcome is returned.
    fn finish(&self, slot: SyncSlot, value: SlotValue, result: Result<(), SyncError>) -> SyncOutcome {
        let mut table = self.table();
        let previous = match table.phases.get(&slot) {
            Some(SyncPhase::Pending { previous }) => *previous,
            settled => {
                let current = table.values.get(&slot).copied().unwrap_or(value);
                return match settled {
                    Some(SyncPhase::RolledBack(failure)) => SyncOutcome::RolledBack {
                        failure: failure.clone(),
                        restored: current,
                    },
                    _ => SyncOutcome::Confirmed(current),
                };
            }
        };

        let outcome = match result {
            Ok(()) => {
                table.phases.insert(slot, SyncPhase::Confirmed);
                SyncOutcome::Confirmed(value)
            }
            Err(failure) => {
                table.values.insert(slot, previous);
                table
                    .phases
                    .insert(slot, SyncPhase::RolledBack(failure.clone()));
                SyncOutcome::RolledBack {
                    failure,
                    restored: previous,
                }
            }
        };
        drop(table);

        match &outcome {
            SyncOutcome::Confirmed(value) => {
                tracing::info!(%slot, ?value, "Remote update confirmed");
                self.emit(SyncEvent::Confirmed {
                    slot,
                    value: *value,
                });
            }
            SyncOutcome::RolledBack { failure, restored } => {
                tracing::warn!(%slot, error = %failure, ?restored, "Remote update failed, rolled back");
                self.emit(SyncEvent::RolledBack {
                    slot,
                    failure: failure.clone(),
                    restored: *restored,
                });
            }
        }
        outcome
    }
}

/// Finishes the slot as failed if the dispatch task is dropped early,
/// either by a panic in the remote call or by runtime shutdown.
struct FinishGuard {
    shared: Arc<Shared>,
    slot: SyncSlot,
    value: SlotValue,
    armed: bool,
}

impl FinishGuard {
    fn complete(mut self, result: Result<(), SyncError>) -> SyncOutcome {
        self.armed = false;
        self.shared.finish(self.slot, self.value, result)
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.finish(
                self.slot,
                self.value,
                Err(SyncError::NetworkUnavailable("sync task aborted".into())),
            );
        }
    }
}

/// Handle to a dispatched request.
#[must_use = "dropping a PendingSync does not cancel it, but its outcome is lost"]
pub struct PendingSync {
    slot: SyncSlot,
    value: SlotValue,
    shared: Arc<Shared>,
    handle: JoinHandle<SyncOutcome>,
}

impl PendingSync {
    pub fn slot(&self) -> SyncSlot {
        self.slot
    }

    /// Wait for the remote call to resolve.
    pub async fn wait(self) -> SyncOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The task died before finishing; don't leave the slot stuck.
                self.shared.finish(
                    self.slot,
                    self.value,
                    Err(SyncError::NetworkUnavailable(format!("sync task aborted: {e}"))),
                )
            }
        }
    }
}

/// Serialises remote mutations per slot and keeps the local view consistent.
pub struct ReconciliationCoordinator<S> {
    service: Arc<S>,
    shared: Arc<Shared>,
}

impl<S> ReconciliationCoordinator<S>
where
    S: AccountListService + 'static,
{
    pub fn new(service: Arc<S>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            shared: Arc::new(Shared {
                table: Mutex::new(SlotTable::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Current local value, optimistic while pending.
    pub fn value(&self, slot: SyncSlot) -> SlotValue {
        self.shared
            .table()
            .values
            .get(&slot)
            .copied()
            .unwrap_or_else(|| slot.initial_value())
    }

    /// Current phase without changing it.
    pub fn phase(&self, slot: SyncSlot) -> SyncPhase {
        self.shared
            .table()
            .phases
            .get(&slot)
            .cloned()
            .unwrap_or(SyncPhase::Idle)
    }

    /// Current phase; a terminal phase is reset to `Idle` once read.
    pub fn observe(&self, slot: SyncSlot) -> SyncPhase {
        let mut table = self.shared.table();
        let phase = table.phases.get(&slot).cloned().unwrap_or(SyncPhase::Idle);
        if phase.is_terminal() {
            table.phases.remove(&slot);
        }
        phase
    }

    /// Record a value known to be true remotely, without dispatching.
    ///
    /// While a request is pending the rollback target is updated instead of
    /// the displayed value.
    pub fn seed(&self, slot: SyncSlot, value: SlotValue) {
        let mut guard = self.shared.table();
        let table = &mut *guard;
        match table.phases.get_mut(&slot) {
            Some(SyncPhase::Pending { previous }) => *previous = value,
            _ => {
                table.values.insert(slot, value);
            }
        }
    }

    pub fn request_membership(
        &self,
        item: MediaRef,
        list: ListRef,
        included: bool,
    ) -> Result<PendingSync, Busy> {
        let slot = SyncSlot::Membership { item, list };
        let service = Arc::clone(&self.service);
        self.dispatch(slot, SlotValue::Included(included), async move {
            service.set_membership(item, list, included).await
        })
    }

    pub fn request_rating(&self, target: RatingTarget, value: f32) -> Result<PendingSync, Busy> {
        let service = Arc::clone(&self.service);
        self.dispatch(
            SyncSlot::Rating(target),
            SlotValue::Rating(Some(value)),
            async move { service.set_rating(target, value).await },
        )
    }

    pub fn request_clear_rating(&self, target: RatingTarget) -> Result<PendingSync, Busy> {
        let service = Arc::clone(&self.service);
        self.dispatch(SyncSlot::Rating(target), SlotValue::Rating(None), async move {
            service.clear_rating(target).await
        })
    }

    fn dispatch<F>(&self, slot: SyncSlot, value: SlotValue, call: F) -> Result<PendingSync, Busy>
    where
        F: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        self.shared.begin(slot, value)?;

        let guard = FinishGuard {
            shared: Arc::clone(&self.shared),
            slot,
            value,
            armed: true,
        };
        let handle = tokio::spawn(async move {
            let result = call.await;
            guard.complete(result)
        });

        Ok(PendingSync {
            slot,
            value,
            shared: Arc::clone(&self.shared),
            handle,
        })
    }
}
