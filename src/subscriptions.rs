//! Subscription bookkeeping.
//!
//! Every slotted user owns a device-presence and a title-presence
//! subscription; the graph itself owns one relationship-channel
//! subscription. Handles live here from subscribe until eviction teardown.

use crate::types::XboxUserId;
use std::collections::HashMap;

/// Opaque handle returned by the presence/social services.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// The per-user subscription pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserSubscriptions {
    pub device_presence: Option<SubscriptionHandle>,
    pub title_presence: Option<SubscriptionHandle>,
}

/// Handles for every tracked user plus the relationship channel.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    users: HashMap<XboxUserId, UserSubscriptions>,
    relationship: Option<SubscriptionHandle>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(
        &mut self,
        id: XboxUserId,
        device_presence: Option<SubscriptionHandle>,
        title_presence: Option<SubscriptionHandle>,
    ) {
        self.users.insert(
            id,
            UserSubscriptions {
                device_presence,
                title_presence,
            },
        );
    }

    /// Removes and returns a user's handles for teardown.
    pub fn take_user(&mut self, id: XboxUserId) -> Option<UserSubscriptions> {
        self.users.remove(&id)
    }

    pub fn set_relationship(&mut self, handle: SubscriptionHandle) {
        self.relationship = Some(handle);
    }
}
