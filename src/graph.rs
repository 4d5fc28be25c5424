//! The social graph core.
//!
//! Owns the double buffer, the queues, the subscription table and the
//! call-buffer timers; hosts the state machine and the event worker. Deltas
//! from the real-time channel, application calls and refresh results are
//! applied linearly to the inactive buffer; the application reads a coherent
//! snapshot once per frame through `do_work` without ever blocking on I/O.

use crate::buffer::{BufferPair, DecrefOutcome, GraphSnapshot};
use crate::call_timer::CallBufferTimer;
use crate::clients::{PeopleHubClient, PresenceClient, RtaClient, RtaEvent, SocialClient};
use crate::config::SocialManagerConfig;
use crate::error::{SocialError, SocialResult};
use crate::events::{
    CompletionContext, InternalEvent, InternalEventQueue, SocialEvent, SocialEventQueue,
    SocialEventType,
};
use crate::subscriptions::SubscriptionTable;
use crate::types::{
    DevicePresenceChangeEventArgs, PresenceRecord, RtaConnectionState,
    RtaSubscriptionErrorEventArgs, SocialNotificationType, SocialRelationshipChangeEventArgs,
    SocialUser, TitlePresenceChangeEventArgs, TitlePresenceState, XboxUserId,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// State machine of the core. Only `Normal` permits a buffer swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    Normal,
    EventProcessing,
    Refresh,
    Diff,
}

/// Per-frame result of `do_work`.
#[derive(Clone, Debug)]
pub struct ChangeStruct {
    /// The active graph snapshot for this frame.
    pub snapshot: GraphSnapshot,
    /// Number of public events appended to the caller's vector.
    pub events_appended: usize,
}

type RtaStateHandler = Box<dyn Fn(RtaConnectionState) + Send + Sync>;

/// Deferred outbound work collected while the apply locks are held and
/// executed once they are released.
enum SideEffect {
    ResolveCompletions {
        completions: Vec<CompletionContext>,
        result: SocialResult<()>,
    },
    FireGraphRefresh {
        ids: Vec<XboxUserId>,
        completions: Vec<CompletionContext>,
    },
    FirePresenceRefresh {
        ids: Vec<XboxUserId>,
    },
    SubscribeUsers {
        ids: Vec<XboxUserId>,
    },
    UnsubscribeUsers {
        ids: Vec<XboxUserId>,
    },
}

/// Locally cached, eventually-consistent projection of the caller's social
/// relationships, enriched with presence and profile data.
pub struct SocialGraphCore {
    pub(crate) config: SocialManagerConfig,
    pub(crate) owner: XboxUserId,
    pub(crate) peoplehub: Arc<dyn PeopleHubClient>,
    pub(crate) presence: Arc<dyn PresenceClient>,
    pub(crate) social: Arc<dyn SocialClient>,
    pub(crate) rta: Arc<dyn RtaClient>,

    /// Critical-section lock held across a replay drain, a fresh apply or a
    /// refresh/diff section. `do_work` never takes it.
    pub(crate) state_mutex: Mutex<()>,
    pub(crate) graph_state: Mutex<GraphState>,
    /// The priority lock: `do_work` takes only this, and nobody holds it
    /// across a suspension point, so the frame wait is bounded.
    pub(crate) buffers: Mutex<BufferPair>,
    pub(crate) subscriptions: Mutex<SubscriptionTable>,
    pub(crate) internal_events: InternalEventQueue,
    pub(crate) social_events: SocialEventQueue,

    pub(crate) graph_refresh_timer: CallBufferTimer,
    pub(crate) presence_refresh_timer: CallBufferTimer,
    pub(crate) resync_timer: CallBufferTimer,

    pub(crate) is_initialized: AtomicBool,
    pub(crate) was_disconnected: AtomicBool,
    pub(crate) is_polling: AtomicBool,
    pub(crate) polling_cancelled: Arc<AtomicBool>,
    pub(crate) events_this_frame: AtomicU32,
    completion_token: AtomicU64,
    rta_state_handler: Mutex<Option<RtaStateHandler>>,

    pub(crate) self_weak: Weak<SocialGraphCore>,
}

impl SocialGraphCore {
    /// Builds the core. Background work starts in `initialize`; timer
    /// callbacks hold only a weak handle and exit silently after teardown.
    pub fn new(
        owner: XboxUserId,
        config: SocialManagerConfig,
        peoplehub: Arc<dyn PeopleHubClient>,
        presence: Arc<dyn PresenceClient>,
        social: Arc<dyn SocialClient>,
        rta: Arc<dyn RtaClient>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SocialGraphCore>| {
            let window = config.time_per_call;

            let refresh_weak = weak.clone();
            let graph_refresh_timer = CallBufferTimer::new(
                window,
                Arc::new(move |ids, completions| {
                    if let Some(core) = refresh_weak.upgrade() {
                        tokio::spawn(async move {
                            core.fetch_users_changed(ids, completions).await;
                        });
                    }
                }),
            );

            let presence_weak = weak.clone();
            let presence_refresh_timer = CallBufferTimer::new(
                window,
                Arc::new(move |ids, _| {
                    if let Some(core) = presence_weak.upgrade() {
                        tokio::spawn(async move {
                            core.fetch_presence_changed(ids).await;
                        });
                    }
                }),
            );

            let resync_weak = weak.clone();
            let resync_timer = CallBufferTimer::new(
                window,
                Arc::new(move |_, _| {
                    if let Some(core) = resync_weak.upgrade() {
                        tokio::spawn(async move {
                            core.refresh_graph().await;
                        });
                    }
                }),
            );

            let headroom = config.extra_user_free_space;
            Self {
                config,
                owner,
                peoplehub,
                presence,
                social,
                rta,
                state_mutex: Mutex::new(()),
                graph_state: Mutex::new(GraphState::Normal),
                buffers: Mutex::new(BufferPair::new(headroom)),
                subscriptions: Mutex::new(SubscriptionTable::new()),
                internal_events: InternalEventQueue::new(),
                social_events: SocialEventQueue::new(),
                graph_refresh_timer,
                presence_refresh_timer,
                resync_timer,
                is_initialized: AtomicBool::new(false),
                was_disconnected: AtomicBool::new(false),
                is_polling: AtomicBool::new(false),
                polling_cancelled: Arc::new(AtomicBool::new(false)),
                events_this_frame: AtomicU32::new(0),
                completion_token: AtomicU64::new(0),
                rta_state_handler: Mutex::new(None),
                self_weak: weak.clone(),
            }
        })
    }

    // ── Public contract ──────────────────────────────────────────────

    /// Fetches the followed-users list, populates both buffers, subscribes
    /// presence for every id and the relationship channel, and spawns the
    /// worker, dispatch and refresh tasks.
    ///
    /// A failed-dependency status from the initial fetch is tolerated: the
    /// graph starts empty and converges on the next refresh.
    pub async fn initialize(self: &Arc<Self>) -> SocialResult<()> {
        if let Err(err) = self.rta.activate().await {
            error!("[SOCIAL] real-time channel activation failed: {err}");
        }

        match self
            .social
            .subscribe_to_social_relationship_change(self.owner)
            .await
        {
            Ok(handle) => self.subscriptions.lock().unwrap().set_relationship(handle),
            Err(err) => error!("[SOCIAL] social relationship change error: {err}"),
        }

        self.spawn_rta_dispatch();
        self.spawn_worker();

        let users = match self
            .peoplehub
            .get_social_graph(self.owner, self.config.detail_level, None)
            .await
        {
            Ok(users) => users,
            Err(SocialError::DependencyFailed(msg)) => {
                warn!("[SOCIAL] initial fetch failed dependency, starting empty: {msg}");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        self.buffers.lock().unwrap().initialize(&users);

        for user in &users {
            let id = user.xbox_user_id;
            let device = self.presence.subscribe_to_device_presence_change(id).await;
            let title = self
                .presence
                .subscribe_to_title_presence_change(id, self.config.title_id)
                .await;
            match (device, title) {
                (Ok(device), Ok(title)) => {
                    self.subscriptions
                        .lock()
                        .unwrap()
                        .insert_user(id, Some(device), Some(title));
                }
                _ => {
                    return Err(SocialError::Runtime(
                        "subscription initialization failed".into(),
                    ))
                }
            }
        }

        let ids: Vec<XboxUserId> = users.iter().map(|u| u.xbox_user_id).collect();
        if !ids.is_empty() {
            self.social_events.push(SocialEvent::new(
                SocialEventType::UsersAddedToSocialGraph,
                ids,
            ));
        }

        self.spawn_periodic_refresh();
        self.is_initialized.store(true, Ordering::SeqCst);
        info!(
            "[SOCIAL] graph initialized for {} with {} users",
            self.owner,
            users.len()
        );
        Ok(())
    }

    /// Queues ids for tracking. Any malformed id rejects the whole call: the
    /// completion resolves with `InvalidArgument` and a public event carries
    /// the error.
    pub fn add_users(
        &self,
        users: &[String],
        completion: Option<oneshot::Sender<SocialResult<()>>>,
    ) {
        let mut ids = Vec::with_capacity(users.len());
        for raw in users {
            match raw.parse::<XboxUserId>() {
                Ok(id) => ids.push(id),
                Err(err) => {
                    warn!("[SOCIAL] add_users rejected: {err}");
                    self.social_events.push(SocialEvent::with_error(
                        SocialEventType::UsersAddedToSocialGraph,
                        Vec::new(),
                        err.clone(),
                    ));
                    if let Some(tx) = completion {
                        let _ = tx.send(Err(err));
                    }
                    return;
                }
            }
        }

        let completions = match completion {
            Some(tx) => vec![CompletionContext {
                token: 0,
                expected_count: ids.len(),
                promise: Some(tx),
            }],
            None => Vec::new(),
        };
        self.internal_events
            .push(InternalEvent::UsersAdded { ids, completions });
    }

    /// Queues ids for untracking; each call drops one reference.
    pub fn remove_users(&self, users: &[XboxUserId]) {
        self.internal_events.push(InternalEvent::UsersRemoved {
            ids: users.to_vec(),
        });
    }

    /// Per-frame pump. Takes the priority lock only and never suspends:
    /// swaps the buffers when the state machine is quiescent, then drains
    /// accumulated public events into `social_events`.
    pub fn do_work(&self, social_events: &mut Vec<SocialEvent>) -> ChangeStruct {
        let snapshot = {
            let mut buffers = self.buffers.lock().unwrap();
            self.events_this_frame.store(0, Ordering::SeqCst);
            if self.state() == GraphState::Normal && buffers.inactive().pending_is_empty() {
                buffers.swap();
            }
            buffers.snapshot()
        };

        let events_appended = if self.state() == GraphState::Normal {
            self.social_events.drain_into(social_events)
        } else {
            0
        };

        ChangeStruct {
            snapshot,
            events_appended,
        }
    }

    /// Installs the application callback invoked on every connection-state
    /// change of the real-time channel.
    pub fn set_rta_state_handler(
        &self,
        handler: impl Fn(RtaConnectionState) + Send + Sync + 'static,
    ) {
        *self.rta_state_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized.load(Ordering::SeqCst)
    }

    pub fn title_id(&self) -> u32 {
        self.config.title_id
    }

    /// True when neither buffer holds unapplied replay events.
    pub fn are_events_empty(&self) -> bool {
        let buffers = self.buffers.lock().unwrap();
        buffers.buffer_a().pending_is_empty() && buffers.buffer_b().pending_is_empty()
    }

    /// Deactivates the real-time channel and cancels polling. Background
    /// tasks exit on their next weak-handle upgrade once the core is
    /// dropped.
    pub async fn shutdown(&self) {
        self.polling_cancelled.store(true, Ordering::SeqCst);
        self.rta.deactivate().await;
        info!("[SOCIAL] graph shut down for {}", self.owner);
    }

    pub fn state(&self) -> GraphState {
        *self.graph_state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: GraphState) {
        *self.graph_state.lock().unwrap() = state;
    }

    // ── Event worker ─────────────────────────────────────────────────

    fn spawn_worker(&self) {
        let weak = self.self_weak.clone();
        let idle = self.config.worker_idle_sleep;
        tokio::spawn(async move {
            loop {
                let busy = match weak.upgrade() {
                    Some(core) => core.do_event_work(),
                    None => {
                        debug!("[SOCIAL] exiting event processing loop");
                        return;
                    }
                };
                if busy {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(idle).await;
                }
            }
        });
    }

    /// One worker iteration. Replays cached mirror events on the inactive
    /// buffer first; otherwise applies one fresh event from the internal
    /// queue, bounded per frame so the swap is never starved. Returns true
    /// when any work was done.
    pub fn do_event_work(&self) -> bool {
        let section = self.state_mutex.lock().unwrap();
        let mut buffers = self.buffers.lock().unwrap();
        let initialized = self.is_initialized.load(Ordering::SeqCst);

        if initialized && !buffers.inactive().pending_is_empty() {
            self.set_state(GraphState::EventProcessing);
            let cached = buffers.inactive_mut().drain_pending();
            for event in cached {
                let _ = self.apply_event(&mut buffers, event, false);
            }
            self.set_state(GraphState::Normal);
            return true;
        }

        self.set_state(GraphState::Normal);
        if !initialized {
            return false;
        }
        if self.events_this_frame.load(Ordering::SeqCst) >= self.config.events_per_frame {
            return false;
        }
        let Some(event) = self.internal_events.pop() else {
            return false;
        };
        self.events_this_frame.fetch_add(1, Ordering::SeqCst);

        let (mirror, effects) = self.apply_event(&mut buffers, event, true);
        if let Some(mirror) = mirror {
            buffers.push_mirror(mirror);
        }
        drop(buffers);
        drop(section);

        self.run_side_effects(effects);
        true
    }

    /// Applies one internal event to the inactive buffer. A fresh apply
    /// emits public events, returns the completion-stripped mirror for
    /// replay on the other buffer and collects side effects; a replay apply
    /// mutates silently.
    fn apply_event(
        &self,
        buffers: &mut BufferPair,
        event: InternalEvent,
        is_fresh: bool,
    ) -> (Option<InternalEvent>, Vec<SideEffect>) {
        let mut effects = Vec::new();
        let mirror = match event {
            InternalEvent::UsersAdded { ids, completions } => {
                self.apply_users_added(buffers, &ids, completions, is_fresh, &mut effects);
                is_fresh.then(|| InternalEvent::UsersAdded {
                    ids,
                    completions: Vec::new(),
                })
            }
            InternalEvent::UsersRemoved { ids } => {
                self.apply_users_removed(buffers, &ids, is_fresh, &mut effects);
                is_fresh.then_some(InternalEvent::UsersRemoved { ids })
            }
            InternalEvent::UsersChanged {
                profiles,
                requested,
                completions,
                err,
            } => {
                let mirror = is_fresh.then(|| InternalEvent::UsersChanged {
                    profiles: profiles.clone(),
                    requested: requested.clone(),
                    completions: Vec::new(),
                    err: err.clone(),
                });
                self.apply_users_changed(
                    buffers,
                    profiles,
                    &requested,
                    completions,
                    err,
                    is_fresh,
                    &mut effects,
                );
                mirror
            }
            InternalEvent::ProfilesChanged { profiles } => {
                self.apply_profile_overwrite(
                    buffers,
                    &profiles,
                    SocialEventType::ProfilesChanged,
                    is_fresh,
                );
                is_fresh.then_some(InternalEvent::ProfilesChanged { profiles })
            }
            InternalEvent::SocialRelationshipsChanged { profiles } => {
                self.apply_profile_overwrite(
                    buffers,
                    &profiles,
                    SocialEventType::SocialRelationshipsChanged,
                    is_fresh,
                );
                is_fresh.then_some(InternalEvent::SocialRelationshipsChanged { profiles })
            }
            InternalEvent::PresenceChanged { records } => {
                self.apply_presence_changed(buffers, &records, is_fresh);
                is_fresh.then_some(InternalEvent::PresenceChanged { records })
            }
            InternalEvent::DevicePresenceChanged { args } => {
                self.apply_device_presence_changed(buffers, &args, is_fresh, &mut effects);
                is_fresh.then_some(InternalEvent::DevicePresenceChanged { args })
            }
            InternalEvent::TitlePresenceChanged { args } => {
                self.apply_title_presence_changed(buffers, &args, is_fresh, &mut effects);
                is_fresh.then_some(InternalEvent::TitlePresenceChanged { args })
            }
        };
        (mirror, effects)
    }

    fn apply_users_added(
        &self,
        buffers: &mut BufferPair,
        ids: &[XboxUserId],
        completions: Vec<CompletionContext>,
        is_fresh: bool,
        effects: &mut Vec<SideEffect>,
    ) {
        let inactive = buffers.inactive_mut();
        let mut to_add = Vec::new();
        for &id in ids {
            if !inactive.incref(id) {
                to_add.push(id);
            }
        }

        if to_add.is_empty() {
            // every id was already tracked; the callers are satisfied now
            if is_fresh && !completions.is_empty() {
                effects.push(SideEffect::ResolveCompletions {
                    completions,
                    result: Ok(()),
                });
            }
            return;
        }

        for &id in &to_add {
            inactive.insert_placeholder(id);
        }

        if is_fresh {
            let token = self.completion_token.fetch_add(1, Ordering::SeqCst) + 1;
            let expected_count = to_add.len();
            let completions = completions
                .into_iter()
                .map(|mut ctx| {
                    ctx.token = token;
                    ctx.expected_count = expected_count;
                    ctx
                })
                .collect();
            effects.push(SideEffect::FireGraphRefresh {
                ids: to_add,
                completions,
            });
        }
    }

    fn apply_users_removed(
        &self,
        buffers: &mut BufferPair,
        ids: &[XboxUserId],
        is_fresh: bool,
        effects: &mut Vec<SideEffect>,
    ) {
        let inactive = buffers.inactive_mut();
        let mut evicted = Vec::new();
        let mut unsubscribe = Vec::new();
        for &id in ids {
            match inactive.decref(id) {
                DecrefOutcome::EvictedUser => {
                    evicted.push(id);
                    unsubscribe.push(id);
                }
                DecrefOutcome::EvictedPlaceholder => evicted.push(id),
                DecrefOutcome::StillPinned => {}
                DecrefOutcome::NotTracked => {
                    warn!("[SOCIAL] remove for untracked user {id}");
                }
            }
        }

        if is_fresh {
            if !unsubscribe.is_empty() {
                effects.push(SideEffect::UnsubscribeUsers { ids: unsubscribe });
            }
            if !evicted.is_empty() {
                self.social_events.push(SocialEvent::new(
                    SocialEventType::UsersRemovedFromSocialGraph,
                    evicted,
                ));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_users_changed(
        &self,
        buffers: &mut BufferPair,
        profiles: Vec<SocialUser>,
        requested: &[XboxUserId],
        completions: Vec<CompletionContext>,
        err: Option<SocialError>,
        is_fresh: bool,
        effects: &mut Vec<SideEffect>,
    ) {
        let expected_total: usize = completions.iter().map(|c| c.expected_count).sum();
        if is_fresh && !completions.is_empty() {
            let result = match &err {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            };
            effects.push(SideEffect::ResolveCompletions {
                completions,
                result,
            });
        }

        if let Some(err) = err {
            if is_fresh {
                self.social_events.push(SocialEvent::with_error(
                    SocialEventType::UsersAddedToSocialGraph,
                    requested.to_vec(),
                    err,
                ));
            }
            return;
        }

        // Results without requested ids come from a refresh diff and may
        // introduce users the graph has never seen. Results of a user call
        // whose context vanished were removed while the fetch was in flight.
        let from_user_call = !requested.is_empty();
        let inactive = buffers.inactive_mut();
        let mut added = Vec::new();
        let mut changed = Vec::new();
        for profile in profiles {
            let id = profile.xbox_user_id;
            let slot = inactive.context(id).map(|ctx| ctx.slot);
            match slot {
                None if from_user_call => {
                    debug!("[SOCIAL] user {id} removed while fetch was in flight");
                }
                None | Some(None) => added.push(profile),
                Some(Some(_)) => {
                    if inactive.user(id) != Some(&profile) {
                        if let Some(user) = inactive.user_mut(id) {
                            *user = profile;
                        }
                        changed.push(id);
                    }
                }
            }
        }

        if !added.is_empty() {
            inactive.ensure_free_slots(added.len().max(expected_total));
            let added_ids: Vec<XboxUserId> = added.iter().map(|u| u.xbox_user_id).collect();
            for user in added {
                inactive.insert_user(user);
            }
            if is_fresh {
                effects.push(SideEffect::SubscribeUsers {
                    ids: added_ids.clone(),
                });
                self.social_events.push(SocialEvent::new(
                    SocialEventType::UsersAddedToSocialGraph,
                    added_ids,
                ));
            }
        }

        if !changed.is_empty() && is_fresh {
            self.social_events
                .push(SocialEvent::new(SocialEventType::ProfilesChanged, changed));
        }
    }

    fn apply_profile_overwrite(
        &self,
        buffers: &mut BufferPair,
        profiles: &[SocialUser],
        kind: SocialEventType,
        is_fresh: bool,
    ) {
        let inactive = buffers.inactive_mut();
        let mut affected = Vec::new();
        for profile in profiles {
            let id = profile.xbox_user_id;
            match inactive.user_mut(id) {
                Some(user) => {
                    *user = profile.clone();
                    affected.push(id);
                }
                None => warn!("[SOCIAL] profile update for user {id} not in graph"),
            }
        }
        if is_fresh && !affected.is_empty() {
            self.social_events.push(SocialEvent::new(kind, affected));
        }
    }

    fn apply_presence_changed(
        &self,
        buffers: &mut BufferPair,
        records: &[PresenceRecord],
        is_fresh: bool,
    ) {
        let inactive = buffers.inactive_mut();
        let mut affected = Vec::new();
        for record in records {
            let id = record.xbox_user_id;
            if id.value() == 0 {
                error!("[SOCIAL] invalid user in presence change");
                continue;
            }
            let Some(user) = inactive.user(id) else {
                debug!("[SOCIAL] presence record for user {id} not in graph");
                continue;
            };
            if user.presence != *record {
                if let Some(user) = inactive.user_mut(id) {
                    user.presence = record.clone();
                }
                affected.push(id);
            }
        }
        if is_fresh && !affected.is_empty() {
            self.social_events.push(SocialEvent::new(
                SocialEventType::PresenceChanged,
                affected,
            ));
        }
    }

    fn apply_device_presence_changed(
        &self,
        buffers: &mut BufferPair,
        args: &DevicePresenceChangeEventArgs,
        is_fresh: bool,
        effects: &mut Vec<SideEffect>,
    ) {
        let inactive = buffers.inactive_mut();
        let Some(user) = inactive.user(args.xbox_user_id) else {
            error!(
                "[SOCIAL] device presence received for user {} not in graph",
                args.xbox_user_id
            );
            return;
        };

        // A logon or a multi-record user needs an authoritative poll; a
        // single-record logoff is updated inline.
        let fire_refresh = user.presence.presence_title_records.len() > 1
            || args.is_user_logged_on_device;
        if fire_refresh {
            if is_fresh {
                effects.push(SideEffect::FirePresenceRefresh {
                    ids: vec![args.xbox_user_id],
                });
            }
        } else if let Some(user) = inactive.user_mut(args.xbox_user_id) {
            user.presence
                .update_device(args.device_type, args.is_user_logged_on_device);
            if is_fresh {
                self.social_events.push(SocialEvent::new(
                    SocialEventType::PresenceChanged,
                    vec![args.xbox_user_id],
                ));
            }
        }
    }

    fn apply_title_presence_changed(
        &self,
        buffers: &mut BufferPair,
        args: &TitlePresenceChangeEventArgs,
        is_fresh: bool,
        effects: &mut Vec<SideEffect>,
    ) {
        match args.title_state {
            TitlePresenceState::Ended => {
                let inactive = buffers.inactive_mut();
                match inactive.user_mut(args.xbox_user_id) {
                    Some(user) => {
                        user.presence.remove_title(args.title_id);
                        if is_fresh {
                            self.social_events.push(SocialEvent::new(
                                SocialEventType::PresenceChanged,
                                vec![args.xbox_user_id],
                            ));
                        }
                    }
                    None => error!(
                        "[SOCIAL] title presence received for user {} not in graph",
                        args.xbox_user_id
                    ),
                }
            }
            // The inline record is insufficient for a start; poll for the
            // authoritative state instead.
            TitlePresenceState::Started => {
                if is_fresh {
                    effects.push(SideEffect::FirePresenceRefresh {
                        ids: vec![args.xbox_user_id],
                    });
                }
            }
        }
    }

    fn run_side_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::ResolveCompletions {
                    completions,
                    result,
                } => {
                    for completion in completions {
                        completion.resolve(result.clone());
                    }
                }
                SideEffect::FireGraphRefresh { ids, completions } => {
                    self.graph_refresh_timer.fire_with(ids, completions);
                }
                SideEffect::FirePresenceRefresh { ids } => {
                    self.presence_refresh_timer.fire(ids);
                }
                SideEffect::SubscribeUsers { ids } => self.spawn_subscribe(ids),
                SideEffect::UnsubscribeUsers { ids } => self.spawn_unsubscribe(ids),
            }
        }
    }

    // ── Outbound calls behind the timers ─────────────────────────────

    pub(crate) async fn fetch_users_changed(
        &self,
        ids: Vec<XboxUserId>,
        completions: Vec<CompletionContext>,
    ) {
        if ids.is_empty() && completions.is_empty() {
            return;
        }
        match self
            .peoplehub
            .get_social_graph(self.owner, self.config.detail_level, Some(&ids))
            .await
        {
            Ok(profiles) => self.internal_events.push(InternalEvent::UsersChanged {
                profiles,
                requested: ids,
                completions,
                err: None,
            }),
            Err(err) => {
                warn!("[SOCIAL] graph fetch failed for {} ids: {err}", ids.len());
                self.internal_events.push(InternalEvent::UsersChanged {
                    profiles: Vec::new(),
                    requested: ids,
                    completions,
                    err: Some(err),
                });
            }
        }
    }

    pub(crate) async fn fetch_presence_changed(&self, ids: Vec<XboxUserId>) {
        if ids.is_empty() {
            return;
        }
        match self
            .presence
            .get_presence_for_multiple_users(
                &ids,
                &[],
                &[],
                crate::types::PresenceDetailLevel::All,
            )
            .await
        {
            Ok(records) => self
                .internal_events
                .push(InternalEvent::PresenceChanged { records }),
            Err(err) => error!("[SOCIAL] presence record update failed: {err}"),
        }
    }

    // ── Subscription lifecycle ───────────────────────────────────────

    fn spawn_subscribe(&self, ids: Vec<XboxUserId>) {
        let weak = self.self_weak.clone();
        tokio::spawn(async move {
            for id in ids {
                let Some(core) = weak.upgrade() else { return };
                let device = core.presence.subscribe_to_device_presence_change(id).await;
                let title = core
                    .presence
                    .subscribe_to_title_presence_change(id, core.config.title_id)
                    .await;
                if device.is_err() || title.is_err() {
                    warn!("[SOCIAL] presence subscription failed for {id}");
                }
                core.subscriptions
                    .lock()
                    .unwrap()
                    .insert_user(id, device.ok(), title.ok());
            }
        });
    }

    fn spawn_unsubscribe(&self, ids: Vec<XboxUserId>) {
        let weak = self.self_weak.clone();
        tokio::spawn(async move {
            for id in ids {
                let Some(core) = weak.upgrade() else { return };
                let subs = core.subscriptions.lock().unwrap().take_user(id);
                let Some(subs) = subs else { continue };
                if let Some(handle) = subs.device_presence {
                    if let Err(err) = core
                        .presence
                        .unsubscribe_from_device_presence_change(handle)
                        .await
                    {
                        warn!("[SOCIAL] device presence unsubscribe failed for {id}: {err}");
                    }
                }
                if let Some(handle) = subs.title_presence {
                    if let Err(err) = core
                        .presence
                        .unsubscribe_from_title_presence_change(handle)
                        .await
                    {
                        warn!("[SOCIAL] title presence unsubscribe failed for {id}: {err}");
                    }
                }
            }
        });
    }

    // ── Real-time channel handlers ───────────────────────────────────

    fn spawn_rta_dispatch(&self) {
        let weak = self.self_weak.clone();
        let rta = Arc::clone(&self.rta);
        tokio::spawn(async move {
            while let Some(event) = rta.next_event().await {
                let Some(core) = weak.upgrade() else { break };
                match event {
                    RtaEvent::ConnectionStateChanged(state) => {
                        core.handle_rta_connection_state_change(state);
                    }
                    RtaEvent::Resync => core.handle_rta_resync(),
                    RtaEvent::SubscriptionError(args) => {
                        core.handle_rta_subscription_error(&args);
                    }
                    RtaEvent::DevicePresenceChanged(args) => {
                        core.handle_device_presence_change(args);
                    }
                    RtaEvent::TitlePresenceChanged(args) => {
                        core.handle_title_presence_change(args);
                    }
                    RtaEvent::SocialRelationshipChanged(args) => {
                        core.handle_social_relationship_change(args);
                    }
                }
            }
            debug!("[SOCIAL] real-time channel closed");
        });
    }

    pub fn handle_device_presence_change(&self, args: DevicePresenceChangeEventArgs) {
        if args.xbox_user_id.value() == 0 {
            error!("[SOCIAL] invalid user in device presence change");
            return;
        }
        self.internal_events
            .push(InternalEvent::DevicePresenceChanged { args });
    }

    pub fn handle_title_presence_change(&self, args: TitlePresenceChangeEventArgs) {
        self.internal_events
            .push(InternalEvent::TitlePresenceChanged { args });
    }

    pub fn handle_social_relationship_change(&self, args: SocialRelationshipChangeEventArgs) {
        match args.social_notification {
            SocialNotificationType::Added => {
                self.internal_events.push(InternalEvent::UsersAdded {
                    ids: args.xbox_user_ids,
                    completions: Vec::new(),
                });
            }
            SocialNotificationType::Changed => {
                self.graph_refresh_timer.fire(args.xbox_user_ids);
            }
            SocialNotificationType::Removed => {
                self.remove_users(&args.xbox_user_ids);
            }
        }
    }

    pub fn handle_rta_subscription_error(&self, args: &RtaSubscriptionErrorEventArgs) {
        error!(
            "[SOCIAL] subscription error on real-time channel: {}",
            args.message
        );
    }

    /// A resync request means server-side subscription state was lost; run a
    /// full refresh through the debouncer.
    pub fn handle_rta_resync(&self) {
        self.resync_timer.fire(Vec::new());
    }

    pub fn handle_rta_connection_state_change(&self, state: RtaConnectionState) {
        match state {
            RtaConnectionState::Disconnected => {
                info!("[SOCIAL] real-time channel disconnected");
                self.was_disconnected.store(true, Ordering::SeqCst);
            }
            RtaConnectionState::Connected => {
                if self.was_disconnected.swap(false, Ordering::SeqCst) {
                    info!("[SOCIAL] real-time channel reconnected, resubscribing");
                    self.spawn_resubscribe();
                }
            }
            RtaConnectionState::Connecting => {}
        }

        if let Some(handler) = self.rta_state_handler.lock().unwrap().as_ref() {
            handler(state);
        }
    }

    fn spawn_resubscribe(&self) {
        let weak = self.self_weak.clone();
        tokio::spawn(async move {
            let Some(core) = weak.upgrade() else { return };
            if let Err(err) = core.rta.activate().await {
                warn!("[SOCIAL] real-time channel reactivation failed: {err}");
            }
            match core
                .social
                .subscribe_to_social_relationship_change(core.owner)
                .await
            {
                Ok(handle) => core.subscriptions.lock().unwrap().set_relationship(handle),
                Err(err) => error!("[SOCIAL] social relationship change error: {err}"),
            }
            let ids = core.buffers.lock().unwrap().inactive().tracked_ids();
            core.spawn_subscribe(ids);
            core.resync_timer.fire(Vec::new());
        });
    }
}

impl std::fmt::Debug for SocialGraphCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialGraphCore")
            .field("owner", &self.owner)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
