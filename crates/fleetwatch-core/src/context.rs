use crate::error::{FleetError, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// State shared by every cycle run against one fleet.
///
/// Holds the exclusivity lock that keeps cycles from overlapping and the
/// token used to cancel an in-flight cycle. Pass one context per fleet; a
/// process may own several.
#[derive(Debug, Default)]
pub struct UpdateContext {
    cycle_lock: Mutex<()>,
    cancel: CancellationToken,
}

/// Proof that a cycle holds the fleet. Dropping it releases the lock.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl UpdateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cycle_lock: Mutex::new(()),
            cancel,
        }
    }

    /// Claim the fleet for a new cycle without waiting.
    pub fn try_begin(&self) -> Result<CycleGuard<'_>> {
        let lock = self
            .cycle_lock
            .try_lock()
            .map_err(|_| FleetError::CycleInProgress)?;
        Ok(CycleGuard {
            _lock: lock,
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
