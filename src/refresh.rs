//! Refresh orchestration: the periodic full-graph refetch, the resync diff
//! and the opt-in rich-presence poll.
//!
//! A refresh fetches the authoritative followed-users list, diffs it against
//! the inactive buffer under the `Diff` state and enqueues one internal
//! event per changed category; the worker then applies them like any other
//! delta, so refresh results and live deltas share a single ordering.

use crate::buffer::UserBuffer;
use crate::events::InternalEvent;
use crate::graph::{GraphState, SocialGraphCore};
use crate::types::{PresenceDetailLevel, PresenceRecord, SocialUser, XboxUserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Per-category outcome of diffing the cached graph against an
/// authoritative fetch.
#[derive(Debug, Default)]
pub struct GraphDelta {
    /// Ids the fetch introduced.
    pub added: Vec<SocialUser>,
    /// Ids that vanished from the fetch and whose stored user was followed.
    pub removed: Vec<XboxUserId>,
    pub presence_changes: Vec<PresenceRecord>,
    pub profile_changes: Vec<SocialUser>,
    pub relationship_changes: Vec<SocialUser>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.presence_changes.is_empty()
            && self.profile_changes.is_empty()
            && self.relationship_changes.is_empty()
    }
}

/// Diffs the previous buffer contents against an authoritative user map.
pub fn diff_graphs(
    previous: &UserBuffer,
    fetched: &HashMap<XboxUserId, SocialUser>,
) -> GraphDelta {
    let mut delta = GraphDelta::default();

    for (id, user) in fetched {
        match previous.user(*id) {
            None => delta.added.push(user.clone()),
            Some(stored) => {
                let flags = stored.diff(user);
                if flags.presence {
                    delta.presence_changes.push(user.presence.clone());
                }
                if flags.profile {
                    delta.profile_changes.push(user.clone());
                }
                if flags.relationship {
                    delta.relationship_changes.push(user.clone());
                }
            }
        }
    }

    for stored in previous.users() {
        if !fetched.contains_key(&stored.xbox_user_id) && stored.is_following_user {
            delta.removed.push(stored.xbox_user_id);
        }
    }

    delta
}

impl SocialGraphCore {
    pub(crate) fn spawn_periodic_refresh(&self) {
        let weak = self.self_weak.clone();
        let period = self.config.refresh_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(core) = weak.upgrade() else { return };
                core.refresh_graph().await;
            }
        });
    }

    /// Full resync against the authoritative graph: refetches manually
    /// tracked ids through the debouncer (the followed list will not contain
    /// them), then fetches the followed list and diffs.
    pub async fn refresh_graph(&self) {
        let manual: Vec<XboxUserId> = {
            let _section = self.state_mutex.lock().unwrap();
            self.set_state(GraphState::Refresh);
            let buffers = self.buffers.lock().unwrap();
            let ids = buffers
                .inactive()
                .users()
                .filter(|user| !user.is_followed_by_caller)
                .map(|user| user.xbox_user_id)
                .collect();
            drop(buffers);
            self.set_state(GraphState::Normal);
            ids
        };
        if !manual.is_empty() {
            self.graph_refresh_timer.fire(manual);
        }

        match self
            .peoplehub
            .get_social_graph(self.owner, self.config.detail_level, None)
            .await
        {
            Ok(users) => {
                let fetched: HashMap<XboxUserId, SocialUser> = users
                    .into_iter()
                    .map(|user| (user.xbox_user_id, user))
                    .collect();
                self.perform_diff(&fetched);
            }
            Err(err) => error!("[SOCIAL] refresh_graph call failed: {err}"),
        }
    }

    /// Diffs under the `Diff` state and enqueues the per-category internal
    /// events.
    pub(crate) fn perform_diff(&self, fetched: &HashMap<XboxUserId, SocialUser>) {
        let delta = {
            let _section = self.state_mutex.lock().unwrap();
            self.set_state(GraphState::Diff);
            let buffers = self.buffers.lock().unwrap();
            let delta = diff_graphs(buffers.inactive(), fetched);
            drop(buffers);
            self.set_state(GraphState::Normal);
            delta
        };

        if delta.is_empty() {
            debug!("[SOCIAL] refresh diff found no changes");
            return;
        }
        info!(
            "[SOCIAL] refresh diff: {} added, {} removed, {} presence, {} profile, {} relationship",
            delta.added.len(),
            delta.removed.len(),
            delta.presence_changes.len(),
            delta.profile_changes.len(),
            delta.relationship_changes.len()
        );

        if !delta.added.is_empty() {
            self.internal_events.push(InternalEvent::UsersChanged {
                profiles: delta.added,
                requested: Vec::new(),
                completions: Vec::new(),
                err: None,
            });
        }
        if !delta.removed.is_empty() {
            self.internal_events.push(InternalEvent::UsersRemoved {
                ids: delta.removed,
            });
        }
        if !delta.presence_changes.is_empty() {
            self.internal_events.push(InternalEvent::PresenceChanged {
                records: delta.presence_changes,
            });
        }
        if !delta.profile_changes.is_empty() {
            self.internal_events.push(InternalEvent::ProfilesChanged {
                profiles: delta.profile_changes,
            });
        }
        if !delta.relationship_changes.is_empty() {
            self.internal_events
                .push(InternalEvent::SocialRelationshipsChanged {
                    profiles: delta.relationship_changes,
                });
        }
    }

    /// Toggles the recurring multi-user presence poll. Cancellation is a
    /// shared flag checked before each iteration and again when an in-flight
    /// call returns, whose results are then discarded.
    pub fn enable_rich_presence_polling(&self, enable: bool) {
        let was_polling = self.is_polling.swap(enable, Ordering::SeqCst);
        if enable && !was_polling {
            self.polling_cancelled.store(false, Ordering::SeqCst);
            let weak = self.self_weak.clone();
            let cancel = Arc::clone(&self.polling_cancelled);
            let period = self.config.time_per_call;
            tokio::spawn(async move {
                loop {
                    if cancel.load(Ordering::SeqCst) {
                        debug!("[SOCIAL] rich presence polling cancelled");
                        return;
                    }
                    let Some(core) = weak.upgrade() else { return };
                    core.poll_presence_once(&cancel).await;
                    drop(core);
                    tokio::time::sleep(period).await;
                }
            });
        } else if !enable {
            self.polling_cancelled.store(true, Ordering::SeqCst);
        }
    }

    async fn poll_presence_once(&self, cancel: &AtomicBool) {
        let ids = self.buffers.lock().unwrap().inactive().tracked_ids();
        if ids.is_empty() {
            return;
        }
        match self
            .presence
            .get_presence_for_multiple_users(&ids, &[], &[], PresenceDetailLevel::All)
            .await
        {
            Ok(records) => {
                if cancel.load(Ordering::SeqCst) {
                    return;
                }
                self.internal_events
                    .push(InternalEvent::PresenceChanged { records });
            }
            Err(err) => error!("[SOCIAL] presence poll failed: {err}"),
        }
    }
}
