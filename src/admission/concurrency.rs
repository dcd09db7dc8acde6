//! Per-model concurrency gates.
//!
//! Each gate bounds how many requests may be in flight against one model and
//! holds the overflow in a bounded wait queue. A released slot is handed to
//! the queued waiter with the highest priority band, FIFO within a band via a
//! monotonic sequence number. A full queue rejects immediately; a waiter
//! whose deadline passes leaves the queue with a timeout.
//!
//! Grants are delivered over oneshot channels, and every send happens while
//! the gate lock is held. That pins down the timeout race: when a timed-out
//! waiter re-locks the gate and finds itself gone from the queue, the grant
//! is already sitting in its channel and the slot must be handed back.

use std::cmp::Reverse;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::OrchestratorError;
use crate::types::RequestPriority;

#[derive(Debug)]
struct Waiter {
    seq: u64,
    priority: RequestPriority,
    tx: oneshot::Sender<()>,
}

#[derive(Debug)]
struct GateState {
    in_flight: usize,
    next_seq: u64,
    queue: Vec<Waiter>,
}

/// Concurrency bound plus bounded wait queue for a single model.
#[derive(Debug)]
pub struct ConcurrencyGate {
    model_id: String,
    max_in_flight: usize,
    queue_capacity: usize,
    state: Mutex<GateState>,
}

impl ConcurrencyGate {
    pub fn new(model_id: impl Into<String>, max_in_flight: usize, queue_capacity: usize) -> Self {
        Self {
            model_id: model_id.into(),
            // A bound of zero would deadlock every caller.
            max_in_flight: max_in_flight.max(1),
            queue_capacity,
            state: Mutex::new(GateState {
                in_flight: 0,
                next_seq: 0,
                queue: Vec::new(),
            }),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot, queueing until `deadline` when the gate is saturated.
    ///
    /// Returns [`OrchestratorError::CapacityExceeded`] without queueing when
    /// the wait queue is full, and [`OrchestratorError::Timeout`] when the
    /// deadline passes first.
    pub async fn acquire(
        self: &Arc<Self>,
        priority: RequestPriority,
        deadline: Instant,
    ) -> Result<SlotPermit, OrchestratorError> {
        let (seq, mut rx) = {
            let mut state = self.lock_state();
            if state.in_flight < self.max_in_flight {
                state.in_flight += 1;
                return Ok(SlotPermit {
                    gate: Arc::clone(self),
                });
            }
            if state.queue.len() >= self.queue_capacity {
                // Entries whose receiver is gone (cancelled callers) no
                // longer count against the queue.
                state.queue.retain(|w| !w.tx.is_closed());
            }
            if state.queue.len() >= self.queue_capacity {
                return Err(OrchestratorError::CapacityExceeded {
                    model_id: self.model_id.clone(),
                    queue_capacity: self.queue_capacity,
                });
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter { seq, priority, tx });
            (seq, rx)
        };

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(())) => Ok(SlotPermit {
                gate: Arc::clone(self),
            }),
            // The sender only drops after a send or with the whole gate;
            // neither can happen while we hold an Arc to it.
            Ok(Err(_)) => Err(OrchestratorError::Internal(
                "concurrency gate dropped a queued waiter".to_string(),
            )),
            Err(_) => {
                let still_queued = {
                    let mut state = self.lock_state();
                    match state.queue.iter().position(|w| w.seq == seq) {
                        Some(idx) => {
                            state.queue.swap_remove(idx);
                            true
                        }
                        None => false,
                    }
                };
                if !still_queued && rx.try_recv().is_ok() {
                    // A grant raced the deadline; hand the slot back.
                    self.release_slot();
                }
                Err(OrchestratorError::Timeout {
                    phase: "while queued for model capacity",
                })
            }
        }
    }

    /// Hand the freed slot to the best live waiter, or decrement `in_flight`
    /// when nobody is waiting. Called from [`SlotPermit::drop`].
    fn release_slot(&self) {
        let mut state = self.lock_state();
        loop {
            let Some(idx) = best_waiter(&state.queue) else {
                state.in_flight = state.in_flight.saturating_sub(1);
                return;
            };
            let waiter = state.queue.swap_remove(idx);
            // Send under the lock; see the module docs. A failed send means
            // the waiter's receiver is gone, so the slot goes to the next.
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
    }

    /// Requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.lock_state().in_flight
    }

    /// Requests currently waiting for a slot.
    pub fn queued(&self) -> usize {
        self.lock_state().queue.len()
    }
}

fn best_waiter(queue: &[Waiter]) -> Option<usize> {
    queue
        .iter()
        .enumerate()
        .min_by_key(|(_, w)| (Reverse(w.priority), w.seq))
        .map(|(idx, _)| idx)
}

/// An in-flight slot on one model's gate. Dropping the permit releases the
/// slot to the next queued waiter.
#[derive(Debug)]
pub struct SlotPermit {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.gate.release_slot();
    }
}
