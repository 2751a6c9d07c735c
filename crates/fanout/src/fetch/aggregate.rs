use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Response item for one requested URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlResult {
    pub url: String,
    pub result: String,
}

/// Pre-sized, index-addressed result slots. Each slot is written at most once,
/// by the task that owns that index, so the aggregate itself needs no lock.
#[derive(Debug, Clone)]
pub struct ResultAggregate {
    slots: Box<[OnceLock<UrlResult>]>,
}

impl ResultAggregate {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Returns `false` when `idx` is out of range or the slot was already written.
    pub fn write(&self, idx: usize, value: UrlResult) -> bool {
        self.slots.get(idx).is_some_and(|slot| slot.set(value).is_ok())
    }

    /// Unwritten slots come out as `UrlResult::default()`.
    pub fn into_vec(self) -> Vec<UrlResult> {
        self.slots
            .into_vec()
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_default())
            .collect()
    }
}
