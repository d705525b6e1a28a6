use serde::Serialize;

/// Maximum number of hint-consuming turns per attempt.
pub const HINT_CEILING: u8 = 3;

/// Server-owned hint counter for exactly one attempt.
///
/// The count never decreases and saturates at [`HINT_CEILING`]; a fresh
/// ledger is created for every attempt, original or mastery check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintLedger {
    count: u8,
}

impl HintLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one hint. At the ceiling this is a no-op returning the ceiling.
    pub fn record_hint(&mut self) -> u8 {
        if self.count < HINT_CEILING {
            self.count += 1;
        }
        self.count
    }

    pub fn current_count(&self) -> u8 {
        self.count
    }

    pub fn remaining(&self) -> u8 {
        HINT_CEILING.saturating_sub(self.count)
    }

    pub fn ceiling_reached(&self) -> bool {
        self.count >= HINT_CEILING
    }
}
