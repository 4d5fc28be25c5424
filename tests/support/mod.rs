//! Shared mock collaborators and pump helpers for the social graph tests.

use async_trait::async_trait;
use social_manager::{
    GraphSnapshot, PeopleHubClient, PresenceClient, PresenceDetailLevel, PresenceDeviceType,
    PresenceRecord, RtaClient, RtaEvent, SocialClient, SocialError, SocialEvent,
    SocialGraphCore, SocialManagerConfig, SocialManagerExtraDetailLevel, SocialResult,
    SocialUser, SubscriptionHandle, TitleRecord, UserPresenceState, XboxUserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TITLE_ID: u32 = 4242;

/// Config with near-zero windows so timers and polls flush immediately,
/// the way the original's unit-test build zeroed its call window.
pub fn test_config() -> SocialManagerConfig {
    SocialManagerConfig {
        title_id: TITLE_ID,
        detail_level: SocialManagerExtraDetailLevel::NoExtraDetail,
        time_per_call: Duration::from_millis(10),
        refresh_interval: Duration::from_secs(3600),
        events_per_frame: 5,
        extra_user_free_space: 5,
        worker_idle_sleep: Duration::from_millis(1),
    }
}

pub fn make_user(id: u64, gamertag: &str) -> SocialUser {
    SocialUser {
        xbox_user_id: XboxUserId(id),
        display_name: gamertag.to_string(),
        gamertag: gamertag.to_string(),
        display_pic_url: format!("https://images.example/{id}"),
        is_followed_by_caller: true,
        is_following_user: true,
        is_favorite: false,
        presence: PresenceRecord::offline(XboxUserId(id)),
    }
}

pub fn online_record(id: u64, title_id: u32) -> PresenceRecord {
    PresenceRecord {
        xbox_user_id: XboxUserId(id),
        user_state: UserPresenceState::Online,
        presence_title_records: vec![TitleRecord {
            title_id,
            is_title_active: true,
            device_type: PresenceDeviceType::XboxOne,
            presence_text: "In game".to_string(),
            last_modified: None,
        }],
    }
}

// ── Mock PeopleHub ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockPeopleHub {
    /// Profiles served for targeted batch fetches.
    pub directory: Mutex<HashMap<XboxUserId, SocialUser>>,
    /// Users returned by full-graph fetches.
    pub followed: Mutex<Vec<SocialUser>>,
    /// Scripted errors, consumed one per call.
    pub fail_next: Mutex<VecDeque<SocialError>>,
    /// Targeted fetches observed, in order.
    pub batch_calls: Mutex<Vec<Vec<XboxUserId>>>,
    pub full_calls: AtomicU64,
}

impl MockPeopleHub {
    pub fn new(followed: Vec<SocialUser>) -> Self {
        let directory = followed
            .iter()
            .map(|user| (user.xbox_user_id, user.clone()))
            .collect();
        Self {
            directory: Mutex::new(directory),
            followed: Mutex::new(followed),
            ..Default::default()
        }
    }

    pub fn insert_profile(&self, user: SocialUser) {
        self.directory
            .lock()
            .unwrap()
            .insert(user.xbox_user_id, user);
    }

    pub fn set_followed(&self, followed: Vec<SocialUser>) {
        for user in &followed {
            self.insert_profile(user.clone());
        }
        *self.followed.lock().unwrap() = followed;
    }

    pub fn push_error(&self, err: SocialError) {
        self.fail_next.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl PeopleHubClient for MockPeopleHub {
    async fn get_social_graph(
        &self,
        _caller: XboxUserId,
        _detail: SocialManagerExtraDetailLevel,
        ids: Option<&[XboxUserId]>,
    ) -> SocialResult<Vec<SocialUser>> {
        if let Some(err) = self.fail_next.lock().unwrap().pop_front() {
            return Err(err);
        }
        match ids {
            None => {
                self.full_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.followed.lock().unwrap().clone())
            }
            Some(ids) => {
                self.batch_calls.lock().unwrap().push(ids.to_vec());
                let directory = self.directory.lock().unwrap();
                Ok(ids
                    .iter()
                    .filter_map(|id| directory.get(id).cloned())
                    .collect())
            }
        }
    }
}

// ── Mock presence service ───────────────────────────────────────

#[derive(Default)]
pub struct MockPresence {
    next_handle: AtomicU64,
    /// (xuid, "device" | "title") subscribe calls in order.
    pub subscribes: Mutex<Vec<(XboxUserId, &'static str)>>,
    pub unsubscribes: Mutex<Vec<SubscriptionHandle>>,
    /// Records served by batched presence queries.
    pub records: Mutex<HashMap<XboxUserId, PresenceRecord>>,
    /// Batched queries observed, in order.
    pub presence_calls: Mutex<Vec<Vec<XboxUserId>>>,
    pub fail_subscribe: AtomicBool,
}

impl MockPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_record(&self, record: PresenceRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.xbox_user_id, record);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.lock().unwrap().len()
    }

    pub fn presence_call_count(&self) -> usize {
        self.presence_calls.lock().unwrap().len()
    }

    fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PresenceClient for MockPresence {
    async fn subscribe_to_device_presence_change(
        &self,
        xuid: XboxUserId,
    ) -> SocialResult<SubscriptionHandle> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SocialError::Subscription("device subscribe failed".into()));
        }
        self.subscribes.lock().unwrap().push((xuid, "device"));
        Ok(self.handle())
    }

    async fn subscribe_to_title_presence_change(
        &self,
        xuid: XboxUserId,
        _title_id: u32,
    ) -> SocialResult<SubscriptionHandle> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SocialError::Subscription("title subscribe failed".into()));
        }
        self.subscribes.lock().unwrap().push((xuid, "title"));
        Ok(self.handle())
    }

    async fn unsubscribe_from_device_presence_change(
        &self,
        handle: SubscriptionHandle,
    ) -> SocialResult<()> {
        self.unsubscribes.lock().unwrap().push(handle);
        Ok(())
    }

    async fn unsubscribe_from_title_presence_change(
        &self,
        handle: SubscriptionHandle,
    ) -> SocialResult<()> {
        self.unsubscribes.lock().unwrap().push(handle);
        Ok(())
    }

    async fn get_presence_for_multiple_users(
        &self,
        xuids: &[XboxUserId],
        _device_filter: &[PresenceDeviceType],
        _title_filter: &[u32],
        _detail: PresenceDetailLevel,
    ) -> SocialResult<Vec<PresenceRecord>> {
        self.presence_calls.lock().unwrap().push(xuids.to_vec());
        let records = self.records.lock().unwrap();
        Ok(xuids
            .iter()
            .map(|id| {
                records
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| PresenceRecord::offline(*id))
            })
            .collect())
    }
}

// ── Mock social service ─────────────────────────────────────────

#[derive(Default)]
pub struct MockSocial {
    next_handle: AtomicU64,
    pub relationship_subscribes: AtomicU64,
}

impl MockSocial {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SocialClient for MockSocial {
    async fn subscribe_to_social_relationship_change(
        &self,
        _xuid: XboxUserId,
    ) -> SocialResult<SubscriptionHandle> {
        self.relationship_subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(SubscriptionHandle(
            self.next_handle.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    async fn unsubscribe_from_social_relationship_change(
        &self,
        _handle: SubscriptionHandle,
    ) -> SocialResult<()> {
        Ok(())
    }
}

// ── Mock real-time channel ──────────────────────────────────────

pub struct MockRta {
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<RtaEvent>>,
    pub activations: AtomicU64,
    pub deactivations: AtomicU64,
}

impl MockRta {
    pub fn new() -> (mpsc::UnboundedSender<RtaEvent>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rta = Arc::new(Self {
            events: tokio::sync::Mutex::new(rx),
            activations: AtomicU64::new(0),
            deactivations: AtomicU64::new(0),
        });
        (tx, rta)
    }
}

#[async_trait]
impl RtaClient for MockRta {
    async fn activate(&self) -> SocialResult<()> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    async fn next_event(&self) -> Option<RtaEvent> {
        self.events.lock().await.recv().await
    }
}

// ── Harness ─────────────────────────────────────────────────────

pub struct Harness {
    pub core: Arc<SocialGraphCore>,
    pub peoplehub: Arc<MockPeopleHub>,
    pub presence: Arc<MockPresence>,
    pub social: Arc<MockSocial>,
    pub rta: Arc<MockRta>,
    pub rta_tx: mpsc::UnboundedSender<RtaEvent>,
}

pub fn harness(followed: Vec<SocialUser>) -> Harness {
    harness_with_config(followed, test_config())
}

pub fn harness_with_config(followed: Vec<SocialUser>, config: SocialManagerConfig) -> Harness {
    let peoplehub = Arc::new(MockPeopleHub::new(followed));
    let presence = Arc::new(MockPresence::new());
    let social = Arc::new(MockSocial::new());
    let (rta_tx, rta) = MockRta::new();
    let core = SocialGraphCore::new(
        XboxUserId(1),
        config,
        peoplehub.clone(),
        presence.clone(),
        social.clone(),
        rta.clone(),
    );
    Harness {
        core,
        peoplehub,
        presence,
        social,
        rta,
        rta_tx,
    }
}

/// Pumps frames until the predicate passes, appending public events to
/// `events`. Panics after roughly one second of frames.
pub async fn pump_until(
    core: &Arc<SocialGraphCore>,
    events: &mut Vec<SocialEvent>,
    mut predicate: impl FnMut(&GraphSnapshot, &[SocialEvent]) -> bool,
) -> GraphSnapshot {
    for _ in 0..500 {
        let change = core.do_work(events);
        if predicate(&change.snapshot, events) {
            return change.snapshot;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("pump_until: condition not reached; events so far: {events:?}");
}

/// Pumps a fixed number of frames to let in-flight work drain.
pub async fn settle(core: &Arc<SocialGraphCore>, events: &mut Vec<SocialEvent>) -> GraphSnapshot {
    let mut snapshot = core.do_work(events).snapshot;
    for _ in 0..25 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        snapshot = core.do_work(events).snapshot;
    }
    snapshot
}

pub fn events_of_type(
    events: &[SocialEvent],
    kind: social_manager::SocialEventType,
) -> Vec<&SocialEvent> {
    events.iter().filter(|e| e.event_type == kind).collect()
}
