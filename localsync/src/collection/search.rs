//! Debounced search
//!
//! Keystrokes update `input_query` immediately. `settled_query` only changes
//! once the input has been quiet for the debounce period and differs from the
//! previous settled value; only that transition dispatches a cache search.
//! Each settle bumps a generation so results from superseded searches are
//! recognised and dropped when they come back.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a keystroke asks the controller to do next
#[derive(Debug)]
pub(crate) enum InputOutcome {
    /// Start a settle timer guarded by this token
    Schedule(CancellationToken),
    /// The box was cleared; results were dropped without a search
    Cleared,
}

#[derive(Debug, Default)]
pub struct SearchEngine {
    input_query: String,
    settled_query: String,
    generation: u64,
    settle_token: Option<CancellationToken>,
    in_flight: bool,
}

impl SearchEngine {
    pub fn input_query(&self) -> &str {
        &self.input_query
    }

    pub fn settled_query(&self) -> &str {
        &self.settled_query
    }

    pub fn is_searching(&self) -> bool {
        self.in_flight
    }

    /// Record a keystroke, cancelling any pending settle timer
    pub(crate) fn on_input(&mut self, text: &str) -> InputOutcome {
        self.input_query = text.to_string();
        if let Some(token) = self.settle_token.take() {
            token.cancel();
        }

        if text.trim().is_empty() {
            self.settled_query.clear();
            self.generation += 1;
            self.in_flight = false;
            return InputOutcome::Cleared;
        }

        let token = CancellationToken::new();
        self.settle_token = Some(token.clone());
        InputOutcome::Schedule(token)
    }

    /// Promote `text` to the settled query if it is still the input and is new.
    /// Returns the generation the search must report back with.
    pub(crate) fn settle(&mut self, text: &str) -> Option<u64> {
        let query = text.trim();
        if self.input_query.trim() != query || self.settled_query == query {
            return None;
        }
        self.settled_query = query.to_string();
        self.generation += 1;
        self.settle_token = None;
        self.in_flight = true;
        Some(self.generation)
    }

    /// Search the settled query again under a new generation, superseding
    /// any search still in flight. `None` when nothing is settled.
    pub(crate) fn rerun(&mut self) -> Option<(u64, String)> {
        if self.settled_query.is_empty() {
            return None;
        }
        self.generation += 1;
        self.in_flight = true;
        Some((self.generation, self.settled_query.clone()))
    }

    /// Whether a search started at `generation` is still the latest one
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub(crate) fn finish(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.in_flight = false;
        }
    }
}

/// Wait out the quiet period. Returns `false` if a newer keystroke cancelled it.
pub(crate) async fn wait_for_quiet(token: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(period) => !token.is_cancelled(),
    }
}
