//! Social manager configuration.

use crate::types::SocialManagerExtraDetailLevel;
use std::time::Duration;

/// Configuration for the social graph engine.
#[derive(Clone, Debug)]
pub struct SocialManagerConfig {
    /// Title id used for title-presence subscriptions.
    pub title_id: u32,

    /// Extra detail requested from PeopleHub, propagated verbatim.
    pub detail_level: SocialManagerExtraDetailLevel,

    /// Quiescence window of the call-buffer timers and the presence poll
    /// period.
    pub time_per_call: Duration,

    /// Period of the full-graph refetch.
    pub refresh_interval: Duration,

    /// Upper bound on internal events applied between two `do_work` calls.
    pub events_per_frame: u32,

    /// Baseline free-slot headroom kept in each user buffer.
    pub extra_user_free_space: usize,

    /// Idle sleep of the event worker when no events are queued.
    pub worker_idle_sleep: Duration,
}

impl Default for SocialManagerConfig {
    fn default() -> Self {
        Self {
            title_id: 0,
            detail_level: SocialManagerExtraDetailLevel::NoExtraDetail,
            time_per_call: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(20 * 60),
            events_per_frame: 5,
            extra_user_free_space: 5,
            worker_idle_sleep: Duration::from_millis(30),
        }
    }
}
