//! Quiescence-window debouncer in front of each outbound service.
//!
//! Bursts of user ids are coalesced into a single callback invocation per
//! window. Ids fired while a flush is pending are absorbed into it; ids
//! fired afterwards wait for the next window boundary, so every id reaches
//! an outbound call within two windows.

use crate::events::CompletionContext;
use crate::types::XboxUserId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Invoked with the accumulated ids and every completion merged since the
/// previous flush. Runs on a spawned task; implementations start their own
/// async work.
pub type TimerCallback = Arc<dyn Fn(Vec<XboxUserId>, Vec<CompletionContext>) + Send + Sync>;

#[derive(Default)]
struct TimerInner {
    pending: Vec<XboxUserId>,
    completions: Vec<CompletionContext>,
    last_call: Option<Instant>,
    armed: bool,
}

/// Debouncer that batches ids for `window` before invoking its callback.
pub struct CallBufferTimer {
    inner: Arc<Mutex<TimerInner>>,
    callback: TimerCallback,
    window: Duration,
}

impl CallBufferTimer {
    /// Must be created inside a tokio runtime; flushes are spawned tasks.
    pub fn new(window: Duration, callback: TimerCallback) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimerInner::default())),
            callback,
            window,
        }
    }

    /// Records ids for the next outbound call.
    pub fn fire(&self, ids: Vec<XboxUserId>) {
        self.fire_with(ids, Vec::new());
    }

    /// Records ids plus completion promises to be handed to the callback.
    /// Flushes immediately when quiescent, otherwise at the next boundary.
    pub fn fire_with(&self, ids: Vec<XboxUserId>, completions: Vec<CompletionContext>) {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            for id in ids {
                if !inner.pending.contains(&id) {
                    inner.pending.push(id);
                }
            }
            inner.completions.extend(completions);
            if inner.armed {
                return;
            }
            inner.armed = true;
            match inner.last_call {
                Some(last) if last.elapsed() < self.window => self.window - last.elapsed(),
                _ => Duration::ZERO,
            }
        };

        let inner = Arc::clone(&self.inner);
        let callback = Arc::clone(&self.callback);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let (ids, completions) = {
                let mut inner = inner.lock().unwrap();
                inner.armed = false;
                inner.last_call = Some(Instant::now());
                (
                    std::mem::take(&mut inner.pending),
                    std::mem::take(&mut inner.completions),
                )
            };
            callback(ids, completions);
        });
    }

    /// Ids waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

impl std::fmt::Debug for CallBufferTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBufferTimer")
            .field("window", &self.window)
            .field("pending", &self.pending_count())
            .finish()
    }
}
