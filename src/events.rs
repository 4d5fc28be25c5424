//! Internal delta events, public events and their queues.
//!
//! Deltas from the real-time channel, application calls and refresh results
//! all land on the internal FIFO queue. The worker applies them to the
//! inactive buffer and emits public events to a parallel queue that
//! `do_work` drains once per frame.

use crate::error::{SocialError, SocialResult};
use crate::types::{
    DevicePresenceChangeEventArgs, PresenceRecord, SocialUser, TitlePresenceChangeEventArgs,
    XboxUserId,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Lets an asynchronous `add_users` call be satisfied once the matching
/// `UsersChanged` result arrives.
#[derive(Debug)]
pub struct CompletionContext {
    pub token: u64,
    pub expected_count: usize,
    pub promise: Option<oneshot::Sender<SocialResult<()>>>,
}

impl CompletionContext {
    /// Resolves the promise, ignoring a dropped receiver.
    pub fn resolve(mut self, result: SocialResult<()>) {
        if let Some(tx) = self.promise.take() {
            let _ = tx.send(result);
        }
    }
}

/// Typed internal delta applied to the inactive buffer.
#[derive(Debug)]
pub enum InternalEvent {
    UsersAdded {
        ids: Vec<XboxUserId>,
        completions: Vec<CompletionContext>,
    },
    UsersRemoved {
        ids: Vec<XboxUserId>,
    },
    /// Result of a batched PeopleHub fetch. `requested` holds the ids the
    /// fetch was issued for (used for error reporting); `completions` holds
    /// every `add_users` promise the debouncer merged into the call.
    UsersChanged {
        profiles: Vec<SocialUser>,
        requested: Vec<XboxUserId>,
        completions: Vec<CompletionContext>,
        err: Option<SocialError>,
    },
    ProfilesChanged {
        profiles: Vec<SocialUser>,
    },
    SocialRelationshipsChanged {
        profiles: Vec<SocialUser>,
    },
    PresenceChanged {
        records: Vec<PresenceRecord>,
    },
    DevicePresenceChanged {
        args: DevicePresenceChangeEventArgs,
    },
    TitlePresenceChanged {
        args: TitlePresenceChangeEventArgs,
    },
}

/// Kind of a public event handed to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocialEventType {
    UsersAddedToSocialGraph,
    UsersRemovedFromSocialGraph,
    PresenceChanged,
    ProfilesChanged,
    SocialRelationshipsChanged,
    SocialUserGroupLoaded,
}

/// Event delivered to the application by `do_work`.
#[derive(Clone, Debug)]
pub struct SocialEvent {
    pub event_type: SocialEventType,
    pub users_affected: Vec<XboxUserId>,
    pub err: Option<SocialError>,
}

impl SocialEvent {
    pub fn new(event_type: SocialEventType, users_affected: Vec<XboxUserId>) -> Self {
        Self {
            event_type,
            users_affected,
            err: None,
        }
    }

    pub fn with_error(
        event_type: SocialEventType,
        users_affected: Vec<XboxUserId>,
        err: SocialError,
    ) -> Self {
        Self {
            event_type,
            users_affected,
            err: Some(err),
        }
    }
}

/// Ordered multi-producer queue of internal deltas. The worker is the sole
/// consumer; FIFO order is the tie-break for racing add/remove/refresh
/// results.
#[derive(Debug, Default)]
pub struct InternalEventQueue {
    queue: Mutex<VecDeque<InternalEvent>>,
}

impl InternalEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: InternalEvent) {
        self.queue.lock().unwrap().push_back(event);
    }

    pub fn pop(&self) -> Option<InternalEvent> {
        self.queue.lock().unwrap().pop_front()
    }
}

/// Read-out queue of public events, drained into the caller's vector once
/// per frame.
#[derive(Debug, Default)]
pub struct SocialEventQueue {
    events: Mutex<Vec<SocialEvent>>,
}

impl SocialEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: SocialEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Moves all accumulated events into `out`, returning how many were
    /// appended.
    pub fn drain_into(&self, out: &mut Vec<SocialEvent>) -> usize {
        let mut events = self.events.lock().unwrap();
        let appended = events.len();
        out.append(&mut events);
        appended
    }
}
