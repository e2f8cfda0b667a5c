//! Pending-send state and the bounded resend controller.
//!
//! MIDI has no transport-level acknowledgment for SysEx.  The upstream
//! device is expected to echo a receipt message through the input port; the
//! adapter's receive path detects it and clears the pending flag.  Until
//! that happens, [`ResendController`] re-issues the identical payload on a
//! fixed interval, up to a fixed budget.
//!
//! The flag is the only state shared between the driver's callback thread
//! and the session task.  It lives in a [`SendState`]: a mutex-guarded
//! tri-state plus a `tokio::sync::Notify` so the waiting side wakes
//! immediately on acknowledgment instead of sleeping out the full interval.

use std::sync::Mutex;

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::application::driver::MidiDriver;
use crate::domain::config::ResendPolicy;

// ── Pending-send state ────────────────────────────────────────────────────────

/// Tri-state marker tracking whether an outbound message is awaiting a
/// hardware-level acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingSend {
    /// No outstanding send.
    Idle,
    /// A send was issued and no matching receive has arrived yet.
    AwaitingAck,
    /// A receive arrived while a send was outstanding.
    Acknowledged,
}

/// Synchronized pending-send flag shared between the send path and the
/// driver's receive callback.
///
/// State transitions:
/// - [`SendState::mark_awaiting`] — send path only, on every send.
/// - [`SendState::acknowledge`] — receive path only; moves
///   `AwaitingAck → Acknowledged` and wakes the resend wait.
/// - [`SendState::take_acknowledged`] — send path only; consumes an
///   acknowledgment back to `Idle`.
#[derive(Debug, Default)]
pub struct SendState {
    state: Mutex<PendingSend>,
    notify: Notify,
}

impl Default for PendingSend {
    fn default() -> Self {
        PendingSend::Idle
    }
}

impl SendState {
    /// Creates a new flag in the `Idle` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a just-issued send as awaiting acknowledgment.
    pub fn mark_awaiting(&self) {
        *self.state.lock().expect("send state lock poisoned") = PendingSend::AwaitingAck;
    }

    /// Records a receive event.  Only an outstanding send transitions to
    /// `Acknowledged`; a receive with nothing pending leaves the flag alone.
    ///
    /// Safe to call from the driver's callback thread.
    pub fn acknowledge(&self) {
        let mut state = self.state.lock().expect("send state lock poisoned");
        if *state == PendingSend::AwaitingAck {
            *state = PendingSend::Acknowledged;
            // notify_one stores a permit, so an acknowledgment that lands
            // before the waiter polls is not lost.
            self.notify.notify_one();
        }
    }

    /// Consumes an acknowledgment: returns `true` and resets to `Idle` if
    /// the flag is `Acknowledged`, otherwise leaves it unchanged.
    pub fn take_acknowledged(&self) -> bool {
        let mut state = self.state.lock().expect("send state lock poisoned");
        if *state == PendingSend::Acknowledged {
            *state = PendingSend::Idle;
            true
        } else {
            false
        }
    }

    /// Forces the flag back to `Idle` (budget exhausted).
    pub fn reset(&self) {
        *self.state.lock().expect("send state lock poisoned") = PendingSend::Idle;
    }

    /// Current state, for assertions and logs.
    pub fn snapshot(&self) -> PendingSend {
        *self.state.lock().expect("send state lock poisoned")
    }

    /// A future that resolves on the next [`SendState::acknowledge`].
    fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

// ── Resend controller ─────────────────────────────────────────────────────────

/// Wraps an outbound send with a bounded, time-spaced acknowledgment wait.
///
/// The wait suspends only the owning session's task; other connections keep
/// dispatching because every session runs on its own task.
#[derive(Debug, Clone)]
pub struct ResendController {
    policy: ResendPolicy,
}

impl ResendController {
    /// Creates a controller with the given retry policy.
    pub fn new(policy: ResendPolicy) -> Self {
        Self { policy }
    }

    /// The policy this controller applies.
    pub fn policy(&self) -> &ResendPolicy {
        &self.policy
    }

    /// Waits for `state` to become acknowledged, re-issuing `payload` on
    /// every interval expiry.
    ///
    /// Returns `true` as soon as the acknowledgment arrives.  Returns
    /// `false` once the retry budget is exhausted or a re-issue fails —
    /// resend is best-effort, so the caller only logs this outcome.
    pub async fn run(
        &self,
        state: &SendState,
        payload: &[u8],
        driver: &mut (dyn MidiDriver + '_),
    ) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            // Arm the wakeup before checking, so an acknowledgment landing
            // in between is caught by the permit rather than lost.
            let notified = state.notified();
            if state.take_acknowledged() {
                return true;
            }
            let _ = timeout(self.policy.interval, notified).await;
            if state.take_acknowledged() {
                return true;
            }

            debug!(attempt, "no acknowledgment yet, resending message");
            if let Err(e) = driver.write(payload) {
                warn!(error = %e, "resend write failed, abandoning retries");
                state.reset();
                return false;
            }
        }

        debug!(
            attempts = self.policy.max_attempts,
            "resend budget exhausted without acknowledgment"
        );
        state.reset();
        false
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
