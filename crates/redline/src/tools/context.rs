//! Turn-scoped mutable state passed explicitly into the coordinator.

use super::read_tracker::{InspectedSet, ReadCache};
use crate::changes::ChangeSetLedger;

/// Everything the coordinator mutates during one turn.
///
/// Owned by the session and lent to the coordinator for each tool call, so
/// independent sessions never share state. The ledger outlives the turn
/// that filled it so the diff can still be rendered afterwards; it is
/// cleared when the next turn begins.
#[derive(Debug, Default)]
pub struct TurnContext {
    pub ledger: ChangeSetLedger,
    pub inspected: InspectedSet,
    pub read_cache: ReadCache,
}

impl TurnContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new turn. Files already open in the editor count as
    /// inspected.
    pub fn begin<I, S>(&mut self, open_paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ledger.clear();
        self.read_cache.clear();
        self.inspected.reset(open_paths);
    }

    /// Drop all turn state (session clear or project switch).
    pub fn discard(&mut self) {
        self.ledger.clear();
        self.read_cache.clear();
        self.inspected.clear();
    }
}
