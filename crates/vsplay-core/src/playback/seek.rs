//! Seek requests
//!
//! Commands record at most one pending request; the demux thread picks it
//! up at the top of its loop and clears it when done, whether the seek
//! worked or not.

use crate::media::SeekDirection;
use std::sync::{Mutex, PoisonError};

/// Absolute seek target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    /// Target position in microseconds
    pub position_us: i64,
    pub direction: SeekDirection,
}

impl SeekRequest {
    pub fn position_secs(&self) -> f64 {
        self.position_us as f64 / 1_000_000.0
    }
}

/// Turn "move by `increment_secs` from `master_clock`" into an absolute request
///
/// The target never goes below zero; the direction follows the sign of
/// the increment.
pub fn relative_seek_target(master_clock: f64, increment_secs: f64) -> SeekRequest {
    let target = (master_clock + increment_secs).max(0.0);
    SeekRequest {
        position_us: (target * 1_000_000.0) as i64,
        direction: if increment_secs < 0.0 {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        },
    }
}

#[derive(Debug, Default)]
pub struct SeekController {
    pending: Mutex<Option<SeekRequest>>,
}

impl SeekController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request unless one is already pending (first one wins)
    pub fn request_seek(&self, request: SeekRequest) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return false;
        }
        *pending = Some(request);
        true
    }

    pub fn pending(&self) -> Option<SeekRequest> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self) -> bool {
        self.pending().is_some()
    }

    /// Clear the pending request
    pub fn complete(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(secs: i64) -> SeekRequest {
        SeekRequest {
            position_us: secs * 1_000_000,
            direction: SeekDirection::Forward,
        }
    }

    #[test]
    fn test_first_pending_wins() {
        let seek = SeekController::new();
        assert!(seek.request_seek(request(10)));
        assert!(!seek.request_seek(request(60)));
        assert_eq!(seek.pending(), Some(request(10)));
    }

    #[test]
    fn test_complete_allows_next_request() {
        let seek = SeekController::new();
        seek.request_seek(request(10));
        seek.complete();
        assert!(!seek.is_pending());
        assert!(seek.request_seek(request(60)));
        assert_eq!(seek.pending().map(|r| r.position_secs()), Some(60.0));
    }

    #[test]
    fn test_relative_target() {
        let fwd = relative_seek_target(12.5, 10.0);
        assert_eq!(fwd.position_us, 22_500_000);
        assert_eq!(fwd.direction, SeekDirection::Forward);

        let back = relative_seek_target(12.5, -10.0);
        assert_eq!(back.position_us, 2_500_000);
        assert_eq!(back.direction, SeekDirection::Backward);
    }

    #[test]
    fn test_relative_target_clamps_at_start() {
        let back = relative_seek_target(3.0, -60.0);
        assert_eq!(back.position_us, 0);
        assert_eq!(back.direction, SeekDirection::Backward);
    }
}
