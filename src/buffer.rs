//! Double-buffered user-graph store.
//!
//! Each buffer owns a slab of user slots plus the id → context map; the pair
//! swaps roles each frame so the application iterates one buffer while the
//! worker mutates the other. Slot indices are stable across growth, so the
//! map can hold them directly; a free-index queue recycles vacated slots.

use crate::events::InternalEvent;
use crate::types::{SocialUser, XboxUserId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Immutable view of the active graph handed to the application each frame.
pub type GraphSnapshot = Arc<HashMap<XboxUserId, SocialUser>>;

/// Tracking state for one id: its slot (none until the profile arrives) and
/// how many independent `add_users` calls currently pin it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub slot: Option<usize>,
    pub ref_count: u32,
}

/// Outcome of dropping one reference to an id.
#[derive(Debug, PartialEq, Eq)]
pub enum DecrefOutcome {
    /// The id was not tracked at all.
    NotTracked,
    /// Still pinned by other `add_users` calls.
    StillPinned,
    /// Reference count hit zero and a stored user was evicted.
    EvictedUser,
    /// Reference count hit zero on an id whose profile never arrived.
    EvictedPlaceholder,
}

/// One half of the double buffer.
#[derive(Debug)]
pub struct UserBuffer {
    storage: Vec<Option<SocialUser>>,
    free_slots: VecDeque<usize>,
    graph: HashMap<XboxUserId, UserContext>,
    pending_events: VecDeque<InternalEvent>,
    headroom: usize,
    dirty: bool,
}

impl UserBuffer {
    pub fn new(headroom: usize) -> Self {
        Self {
            storage: Vec::new(),
            free_slots: VecDeque::new(),
            graph: HashMap::new(),
            pending_events: VecDeque::new(),
            headroom,
            dirty: false,
        }
    }

    /// Resets the buffer to hold exactly `users`, each with `ref_count = 1`,
    /// plus the baseline free-slot headroom.
    pub fn initialize(&mut self, users: &[SocialUser]) {
        self.storage = Vec::with_capacity(users.len() + self.headroom);
        self.free_slots.clear();
        self.graph.clear();
        self.pending_events.clear();
        for user in users {
            let slot = self.storage.len();
            self.graph.insert(
                user.xbox_user_id,
                UserContext {
                    slot: Some(slot),
                    ref_count: 1,
                },
            );
            self.storage.push(Some(user.clone()));
        }
        for _ in 0..self.headroom {
            self.free_slots.push_back(self.storage.len());
            self.storage.push(None);
        }
        self.dirty = true;
    }

    pub fn context(&self, id: XboxUserId) -> Option<&UserContext> {
        self.graph.get(&id)
    }

    pub fn contains(&self, id: XboxUserId) -> bool {
        self.graph.contains_key(&id)
    }

    pub fn user(&self, id: XboxUserId) -> Option<&SocialUser> {
        let slot = self.graph.get(&id)?.slot?;
        self.storage[slot].as_ref()
    }

    pub fn user_mut(&mut self, id: XboxUserId) -> Option<&mut SocialUser> {
        let slot = self.graph.get(&id)?.slot?;
        self.dirty = true;
        self.storage[slot].as_mut()
    }

    /// Ids whose profile has arrived (i.e. that occupy a slot).
    pub fn tracked_ids(&self) -> Vec<XboxUserId> {
        self.graph
            .iter()
            .filter(|(_, ctx)| ctx.slot.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of users occupying slots.
    pub fn user_count(&self) -> usize {
        self.graph.values().filter(|ctx| ctx.slot.is_some()).count()
    }

    pub fn users(&self) -> impl Iterator<Item = &SocialUser> {
        self.storage.iter().filter_map(|slot| slot.as_ref())
    }

    /// Bumps the reference count of a tracked id. Returns false when the id
    /// is unknown.
    pub fn incref(&mut self, id: XboxUserId) -> bool {
        match self.graph.get_mut(&id) {
            Some(ctx) => {
                ctx.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Registers an id awaiting its profile, with `ref_count = 1`.
    pub fn insert_placeholder(&mut self, id: XboxUserId) {
        self.graph.insert(
            id,
            UserContext {
                slot: None,
                ref_count: 1,
            },
        );
        self.dirty = true;
    }

    /// Drops one reference; on zero the slot (if any) is released and the id
    /// erased. Saturates at zero.
    pub fn decref(&mut self, id: XboxUserId) -> DecrefOutcome {
        let Some(ctx) = self.graph.get_mut(&id) else {
            return DecrefOutcome::NotTracked;
        };
        ctx.ref_count = ctx.ref_count.saturating_sub(1);
        if ctx.ref_count > 0 {
            return DecrefOutcome::StillPinned;
        }
        let slot = ctx.slot;
        self.graph.remove(&id);
        self.dirty = true;
        match slot {
            Some(slot) => {
                self.storage[slot] = None;
                self.free_slots.push_back(slot);
                DecrefOutcome::EvictedUser
            }
            None => DecrefOutcome::EvictedPlaceholder,
        }
    }

    /// Grows the slab until at least `needed` free slots exist. Existing
    /// slot indices stay valid; every live user is untouched.
    pub fn ensure_free_slots(&mut self, needed: usize) {
        if self.free_slots.len() >= needed {
            return;
        }
        let add = (needed - self.free_slots.len()).max(self.headroom);
        self.storage.reserve(add);
        for _ in 0..add {
            self.free_slots.push_back(self.storage.len());
            self.storage.push(None);
        }
    }

    /// Stores a fetched profile. A context is created (`ref_count = 1`) when
    /// none exists; a context without a slot gets one from the free list.
    pub fn insert_user(&mut self, user: SocialUser) {
        let id = user.xbox_user_id;
        if !self.graph.contains_key(&id) {
            self.graph.insert(
                id,
                UserContext {
                    slot: None,
                    ref_count: 1,
                },
            );
        }
        match self.graph.get(&id).and_then(|ctx| ctx.slot) {
            Some(slot) => self.storage[slot] = Some(user),
            None => {
                self.ensure_free_slots(1);
                let slot = self.free_slots.pop_front().expect("free slot available");
                self.storage[slot] = Some(user);
                if let Some(ctx) = self.graph.get_mut(&id) {
                    ctx.slot = Some(slot);
                }
            }
        }
        self.dirty = true;
    }

    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }

    // ── Pending replay events ──

    pub fn push_pending(&mut self, event: InternalEvent) {
        self.pending_events.push_back(event);
    }

    pub fn drain_pending(&mut self) -> Vec<InternalEvent> {
        self.pending_events.drain(..).collect()
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending_events.is_empty()
    }

    // ── Views ──

    /// Materializes the slotted users into a plain map.
    pub fn user_map(&self) -> HashMap<XboxUserId, SocialUser> {
        self.graph
            .iter()
            .filter_map(|(id, ctx)| {
                let slot = ctx.slot?;
                Some((*id, self.storage[slot].clone()?))
            })
            .collect()
    }

    /// Structural equality: same key set, same reference counts, same user
    /// values. Slot numbering and slab layout are ignored.
    pub fn same_graph(&self, other: &UserBuffer) -> bool {
        if self.graph.len() != other.graph.len() {
            return false;
        }
        self.graph.iter().all(|(id, ctx)| {
            let Some(other_ctx) = other.graph.get(id) else {
                return false;
            };
            ctx.ref_count == other_ctx.ref_count && self.user(*id) == other.user(*id)
        })
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// The A/B buffer pair plus the cached application-facing snapshot.
#[derive(Debug)]
pub struct BufferPair {
    a: UserBuffer,
    b: UserBuffer,
    active_is_a: bool,
    snapshot: GraphSnapshot,
}

impl BufferPair {
    pub fn new(headroom: usize) -> Self {
        Self {
            a: UserBuffer::new(headroom),
            b: UserBuffer::new(headroom),
            active_is_a: true,
            snapshot: Arc::new(HashMap::new()),
        }
    }

    /// Populates both buffers identically and seeds the snapshot.
    pub fn initialize(&mut self, users: &[SocialUser]) {
        self.a.initialize(users);
        self.b.initialize(users);
        self.snapshot = Arc::new(self.active().user_map());
        self.active_buffer_mut().clear_dirty();
    }

    pub fn active(&self) -> &UserBuffer {
        if self.active_is_a {
            &self.a
        } else {
            &self.b
        }
    }

    pub fn inactive(&self) -> &UserBuffer {
        if self.active_is_a {
            &self.b
        } else {
            &self.a
        }
    }

    pub fn inactive_mut(&mut self) -> &mut UserBuffer {
        if self.active_is_a {
            &mut self.b
        } else {
            &mut self.a
        }
    }

    fn active_buffer_mut(&mut self) -> &mut UserBuffer {
        if self.active_is_a {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    /// Records the mirror of a freshly applied event on the active buffer;
    /// after the next swap that buffer is the inactive one and the worker
    /// replays the mirror, converging the pair.
    pub fn push_mirror(&mut self, event: InternalEvent) {
        self.active_buffer_mut().push_pending(event);
    }

    /// Swaps reader and writer roles. The snapshot is rebuilt only when the
    /// newly active buffer was mutated since it last held the role.
    pub fn swap(&mut self) {
        self.active_is_a = !self.active_is_a;
        if self.active().is_dirty() {
            self.snapshot = Arc::new(self.active().user_map());
            self.active_buffer_mut().clear_dirty();
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        Arc::clone(&self.snapshot)
    }

    pub fn buffer_a(&self) -> &UserBuffer {
        &self.a
    }

    pub fn buffer_b(&self) -> &UserBuffer {
        &self.b
    }
}
