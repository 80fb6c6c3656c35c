//! Single-slot undo window for deletes
//!
//! At most one deletion is pending per controller. Each pending deletion has
//! a ticket and a cancellation token; the countdown task only commits when its
//! ticket is still the one in the slot.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which in-memory lists held the item when it was removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedFrom {
    pub collection: bool,
    pub filtered: bool,
    pub search: bool,
}

impl RemovedFrom {
    pub fn any(&self) -> bool {
        self.collection || self.filtered || self.search
    }
}

#[derive(Debug)]
pub struct PendingDeletion<T> {
    pub item: T,
    pub remaining_secs: f64,
    pub removed_from: RemovedFrom,
    ticket: u64,
    token: CancellationToken,
}

impl<T> PendingDeletion<T> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

/// What observers see of the pending deletion
#[derive(Debug, Clone, Serialize)]
pub struct PendingDeletionView<T> {
    pub item: T,
    pub remaining_secs: f64,
}

#[derive(Debug)]
pub struct UndoSlot<T> {
    pending: Option<PendingDeletion<T>>,
    next_ticket: u64,
}

impl<T> Default for UndoSlot<T> {
    fn default() -> Self {
        Self {
            pending: None,
            next_ticket: 0,
        }
    }
}

impl<T: Clone> UndoSlot<T> {
    /// Put `item` in the slot, returning whatever it replaced (already cancelled)
    pub(crate) fn begin(
        &mut self,
        item: T,
        removed_from: RemovedFrom,
        window: Duration,
    ) -> (Option<PendingDeletion<T>>, u64, CancellationToken) {
        let replaced = self.take();
        self.next_ticket += 1;
        let token = CancellationToken::new();
        self.pending = Some(PendingDeletion {
            item,
            remaining_secs: window.as_secs_f64(),
            removed_from,
            ticket: self.next_ticket,
            token: token.clone(),
        });
        (replaced, self.next_ticket, token)
    }

    /// Empty the slot and cancel its countdown
    pub(crate) fn take(&mut self) -> Option<PendingDeletion<T>> {
        let pending = self.pending.take()?;
        pending.cancel();
        Some(pending)
    }

    /// Empty the slot only if it still holds `ticket`
    pub(crate) fn take_ticket(&mut self, ticket: u64) -> Option<PendingDeletion<T>> {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => self.take(),
            _ => None,
        }
    }

    pub(crate) fn tick(&mut self, ticket: u64, step: Duration) {
        if let Some(pending) = self.pending.as_mut() {
            if pending.ticket == ticket {
                pending.remaining_secs = (pending.remaining_secs - step.as_secs_f64()).max(0.0);
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingDeletion<T>> {
        self.pending.as_ref()
    }

    pub fn view(&self) -> Option<PendingDeletionView<T>> {
        self.pending.as_ref().map(|p| PendingDeletionView {
            item: p.item.clone(),
            remaining_secs: p.remaining_secs,
        })
    }
}

/// Tick count for a countdown of `window` in steps of `tick`
pub(crate) fn tick_count(window: Duration, tick: Duration) -> u32 {
    if tick.is_zero() {
        return 0;
    }
    (window.as_secs_f64() / tick.as_secs_f64()).round() as u32
}
