//! Exclusive long-running activity slot of a session.
//!
//! A batch and a monitor job never run against the same session at the
//! same time. Whoever claims the slot holds it until the guard drops.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{StateError, ToolboxError};
use crate::Result;

/// Long-running work that needs the session for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Batch,
    Monitor,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => f.write_str("command batch"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ActivitySlot {
    holder: Mutex<Option<Activity>>,
}

impl ActivitySlot {
    pub(crate) fn try_claim(self: &Arc<Self>, activity: Activity) -> Result<ActivityGuard> {
        let mut holder = self
            .holder
            .lock()
            .map_err(|_| ToolboxError::LockPoisoned)?;

        if let Some(current) = *holder {
            return Err(StateError::Busy(current).into());
        }
        *holder = Some(activity);

        Ok(ActivityGuard {
            slot: Arc::clone(self),
            activity,
        })
    }

    pub(crate) fn current(&self) -> Option<Activity> {
        self.holder.lock().ok().and_then(|h| *h)
    }
}

/// Releases the activity slot when dropped.
#[derive(Debug)]
pub struct ActivityGuard {
    slot: Arc<ActivitySlot>,
    activity: Activity,
}

impl ActivityGuard {
    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.slot.holder.lock() {
            *holder = None;
        }
    }
}
