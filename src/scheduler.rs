//! Slot clock, codeword accounting, and the send-decision dispatcher (C5,
//! §4.5). This is the core of the core.
//!
//! Grounded on `examples/original_source/DAPNETGateway.cpp`'s
//! `calculateCodewords()`/`sendMessages()`/the main-loop slot bookkeeping.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::message::{Functional, PagingMessage};
use crate::queue::MessageQueue;
use crate::schedule::Schedule;

pub const CODEWORD_TIME_US: u64 = 26_667;
pub const FRAME_LENGTH_CW: u64 = 2;
pub const BATCH_LENGTH_CW: u64 = 17;
pub const PREAMBLE_LENGTH_CW: u64 = BATCH_LENGTH_CW + 1;
pub const SLOT_TIME_US: u64 = 6_400_000;
pub const SLOT_TIME_MS: u64 = 6_400;
pub const CODEWORDS_PER_SLOT: u64 = SLOT_TIME_US / CODEWORD_TIME_US;

/// A time-sync message queued longer than this is stale and is dropped
/// rather than sent (§4.5.5).
const TIME_SYNC_MAX_AGE: Duration = Duration::from_millis(15_000);

/// Monotonic 16-slot, 6.4 s-per-slot wall clock (§4.5.1), started at
/// construction and advanced by polling [`SlotClock::tick`].
pub struct SlotClock {
    started_at: Instant,
    current_slot: usize,
    // Forces the first `tick()` to report a change even though the
    // computed slot may still equal the construction-time value — the
    // transition into slot 0 at process start is itself a slot change
    // (§4.5.1), not something to wait a further 6.4 s to observe.
    ticked: bool,
}

impl SlotClock {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            current_slot: Self::slot_for(Duration::ZERO),
            ticked: false,
        }
    }

    fn slot_for(elapsed: Duration) -> usize {
        let t_us = elapsed.as_micros() as u64;
        let t = (t_us / 100_000) % 1024;
        (t / 64) as usize
    }

    /// Milliseconds elapsed so far within the current 6.4 s slot.
    pub fn slot_elapsed_ms(&self) -> u64 {
        let t_us = self.started_at.elapsed().as_micros() as u64;
        let t = (t_us / 100_000) % 1024;
        (t % 64) * 100
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Recompute the current slot; returns `true` if it changed since the
    /// last call (§4.5.1's "when slot changes" trigger), which is always
    /// the case on the very first call.
    pub fn tick(&mut self) -> bool {
        let slot = Self::slot_for(self.started_at.elapsed());
        let changed = !self.ticked || slot != self.current_slot;
        self.current_slot = slot;
        self.ticked = true;
        changed
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        Self::new()
    }
}

/// POCSAG codeword length for a message, per §4.5.2's formula, preserved
/// bit-exactly including the unusual final `len += len % 16` step.
pub fn codewords(message: &PagingMessage) -> u64 {
    let mut len: u64 = match message.functional {
        Functional::Numeric => (message.length() as u64) / 5,
        Functional::Alphanumeric | Functional::Alert2 => (message.length() as u64 * 7) / 20,
        Functional::Alert1 => 0,
    };
    len += 1;
    if len % 2 != 0 {
        len += 1;
    }
    len += len % 16;
    len
}

/// Outcome of one send-decision step, reported for logging/testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    ModemBusy,
    NoSchedule,
    SlotNotAllowed,
    QueueEmpty,
    NoRoomInSlot,
    WouldNotFit,
    StaleTimeSyncDropped,
    Sent,
}

/// Owns the pending-message queue, the schedule, the slot clock, and the
/// per-slot codeword budget; decides when and what to send (§4.5).
pub struct Dispatcher {
    pub queue: MessageQueue,
    schedule: Option<Schedule>,
    clock: SlotClock,
    sent_codewords: u64,
    modem_idle: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: MessageQueue::new(),
            schedule: None,
            clock: SlotClock::new(),
            sent_codewords: 0,
            modem_idle: false,
        }
    }

    pub fn set_modem_idle(&mut self, idle: bool) {
        let was_idle = self.modem_idle;
        self.modem_idle = idle;
        // §4.5.3: on a busy -> idle transition, assume continuous
        // transmission for the elapsed portion of the slot.
        if !was_idle && idle {
            let elapsed_ms = self.clock.slot_elapsed_ms();
            self.sent_codewords = (elapsed_ms * 1000) / CODEWORD_TIME_US;
        }
    }

    /// Advance the slot clock; when the slot changes, reset the per-slot
    /// counters. A cached schedule is adopted only on a slot-change event:
    /// either the first one seen (there being no schedule yet), or the one
    /// at the end of a full 16-slot cycle (§4.5.1).
    pub fn advance_clock(&mut self, incoming_schedule: &mut Option<Schedule>) {
        let changed = self.clock.tick();
        let cycle_wrapped = changed && self.clock.current_slot() == 0;
        if changed && (self.schedule.is_none() || cycle_wrapped) {
            if let Some(s) = incoming_schedule.take() {
                self.schedule = Some(s);
            }
        }
        if changed {
            self.sent_codewords = 0;
        }
    }

    pub fn current_slot(&self) -> usize {
        self.clock.current_slot()
    }

    pub fn sent_codewords(&self) -> u64 {
        self.sent_codewords
    }

    /// The §4.5.4 send decision: attempt to send at most one message.
    /// `send` performs the actual C3 write; it is only invoked when a
    /// message is chosen, and its return value decides whether the
    /// codeword budget is charged (§4.5.4 step 10).
    pub async fn decide_and_send<F, Fut>(&mut self, send: F) -> SendDecision
    where
        F: FnOnce(PagingMessage) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        if !self.modem_idle {
            return SendDecision::ModemBusy;
        }
        let Some(schedule) = &self.schedule else {
            return SendDecision::NoSchedule;
        };
        if !schedule.all_slots() && !schedule.is_allowed(self.clock.current_slot()) {
            return SendDecision::SlotNotAllowed;
        }
        if self.queue.is_empty() {
            return SendDecision::QueueEmpty;
        }

        let all_slots = schedule.all_slots();
        if all_slots {
            return self.send_message(send).await;
        }

        let message = self.queue.peek_back().expect("checked non-empty above");
        let cw = codewords(message);
        let total = self.sent_codewords + PREAMBLE_LENGTH_CW + cw;
        if total >= CODEWORDS_PER_SLOT {
            return SendDecision::NoRoomInSlot;
        }

        let send_time_ms = (PREAMBLE_LENGTH_CW + cw) * CODEWORD_TIME_US / 1000;
        let time_left_ms = SLOT_TIME_MS.saturating_sub(self.clock.slot_elapsed_ms());
        if send_time_ms >= time_left_ms {
            return SendDecision::WouldNotFit;
        }

        let outcome = self.send_message(send).await;
        if outcome == SendDecision::Sent {
            self.sent_codewords = total;
        }
        outcome
    }

    /// §4.5.5: apply time-sync aging, then hand the message to `send`,
    /// popping it from the queue either way.
    async fn send_message<F, Fut>(&mut self, send: F) -> SendDecision
    where
        F: FnOnce(PagingMessage) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let message = self.queue.peek_back().expect("caller checked non-empty");

        if message.is_time_sync() && message.queued_at.elapsed() > TIME_SYNC_MAX_AGE {
            debug!("dropping stale time-sync message");
            self.queue.pop_back();
            return SendDecision::StaleTimeSyncDropped;
        }

        let message = self.queue.pop_back().expect("peeked above");
        send(message).await;
        SendDecision::Sent
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
