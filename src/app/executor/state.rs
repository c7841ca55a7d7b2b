//! Executor lifecycle states

use std::fmt;

use serde::Serialize;

/// Where an executor is in the life of its request
///
/// ```text
/// Created -> PreProcessing -> CacheCheck -> CacheHitFresh ------------------+
///                                        -> CacheHitStale -+                |
///                                        -> CacheMiss -----+-> NetworkAttempt
///                                                              |  ^         |
///                                                              v  |         |
///                                                              Retry        |
///                                      Success | Failure -> PostProcessing -> Finished
/// ```
///
/// `Cancelled` can follow any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecState {
    Created,
    PreProcessing,
    CacheCheck,
    CacheHitFresh,
    CacheHitStale,
    CacheMiss,
    NetworkAttempt,
    Retry,
    Success,
    Failure,
    PostProcessing,
    Finished,
    Cancelled,
}

impl ExecState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecState::Finished | ExecState::Cancelled)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: ExecState) -> bool {
        use ExecState::*;

        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Created, PreProcessing)
                | (PreProcessing, CacheCheck)
                | (PreProcessing, NetworkAttempt)
                | (CacheCheck, CacheHitFresh | CacheHitStale | CacheMiss)
                | (CacheHitFresh, PostProcessing)
                | (CacheHitStale | CacheMiss, NetworkAttempt)
                | (NetworkAttempt, Success | Failure | Retry)
                | (Retry, NetworkAttempt)
                | (Success | Failure, PostProcessing)
                | (PostProcessing, Finished)
        )
    }
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecState::Created => "created",
            ExecState::PreProcessing => "pre-processing",
            ExecState::CacheCheck => "cache-check",
            ExecState::CacheHitFresh => "cache-hit-fresh",
            ExecState::CacheHitStale => "cache-hit-stale",
            ExecState::CacheMiss => "cache-miss",
            ExecState::NetworkAttempt => "network-attempt",
            ExecState::Retry => "retry",
            ExecState::Success => "success",
            ExecState::Failure => "failure",
            ExecState::PostProcessing => "post-processing",
            ExecState::Finished => "finished",
            ExecState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
