use std::sync::{Mutex, PoisonError};

use crate::FetchError;

/// First-writer-wins error cell shared by the fetch tasks of one operation.
#[derive(Debug, Default)]
pub struct CapturedError {
    slot: Mutex<Option<FetchError>>,
}

impl CapturedError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `err` if nothing is stored yet. Returns whether this call won.
    pub fn try_capture(&self, err: FetchError) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    pub fn read(&self) -> Option<FetchError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_inner(self) -> Option<FetchError> {
        self.slot.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_only_first_capture_is_kept() {
        let captured = CapturedError::new();
        assert!(captured.read().is_none());

        assert!(captured.try_capture(FetchError::timeout("http://a.test/1")));
        assert!(!captured.try_capture(FetchError::timeout("http://a.test/2")));
        assert_eq!(captured.read(), Some(FetchError::timeout("http://a.test/1")));
        assert_eq!(
            captured.into_inner(),
            Some(FetchError::timeout("http://a.test/1"))
        );
    }

    #[test]
    fn test_concurrent_captures_have_one_winner() {
        let captured = Arc::new(CapturedError::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let captured = captured.clone();
                thread::spawn(move || {
                    let err = FetchError::unprocessable(format!("http://a.test/{i}"), "boom");
                    (captured.try_capture(err.clone()), err)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|(won, _)| *won).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(captured.read().as_ref(), Some(&winners[0].1));
    }
}
