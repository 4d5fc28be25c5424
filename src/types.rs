//! Identity, profile and presence types shared across the engine.

use crate::error::SocialError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit Xbox user id. The sole key across all graph tables.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct XboxUserId(pub u64);

impl XboxUserId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for XboxUserId {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u64 = s
            .trim()
            .parse()
            .map_err(|_| SocialError::InvalidArgument(format!("malformed xbox user id: {s:?}")))?;
        if id == 0 {
            return Err(SocialError::InvalidArgument(
                "xbox user id must be non-zero".into(),
            ));
        }
        Ok(XboxUserId(id))
    }
}

impl fmt::Display for XboxUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Extra detail requested from PeopleHub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocialManagerExtraDetailLevel {
    NoExtraDetail,
    PreferredColor,
    TitleHistory,
    All,
}

/// Detail level for batched presence queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceDetailLevel {
    User,
    Device,
    Title,
    All,
}

/// Device class a user can be present on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PresenceDeviceType {
    #[default]
    Unknown,
    Pc,
    XboxOne,
    Xbox360,
    Ios,
    Android,
}

/// Overall online state of a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserPresenceState {
    #[default]
    Unknown,
    Online,
    Away,
    Offline,
}

/// Whether a title session started or ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TitlePresenceState {
    Started,
    Ended,
}

/// Kind of relationship change delivered on the real-time channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocialNotificationType {
    Added,
    Changed,
    Removed,
}

/// Connection state of the real-time activity channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtaConnectionState {
    Connected,
    Connecting,
    Disconnected,
}

/// One title a user is (or was) playing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub title_id: u32,
    pub is_title_active: bool,
    pub device_type: PresenceDeviceType,
    pub presence_text: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A user's online state plus their per-title records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PresenceRecord {
    pub xbox_user_id: XboxUserId,
    pub user_state: UserPresenceState,
    pub presence_title_records: Vec<TitleRecord>,
}

impl PresenceRecord {
    pub fn offline(xbox_user_id: XboxUserId) -> Self {
        Self {
            xbox_user_id,
            user_state: UserPresenceState::Offline,
            presence_title_records: Vec::new(),
        }
    }

    /// Applies an inline device-presence delta: title records on the device
    /// follow the logon flag, and the overall state is recomputed.
    pub fn update_device(&mut self, device_type: PresenceDeviceType, is_logged_on: bool) {
        for record in &mut self.presence_title_records {
            if record.device_type == device_type {
                record.is_title_active = is_logged_on;
            }
        }
        let any_active = self
            .presence_title_records
            .iter()
            .any(|r| r.is_title_active);
        self.user_state = if is_logged_on || any_active {
            UserPresenceState::Online
        } else {
            UserPresenceState::Offline
        };
    }

    /// Drops the record for a title that ended.
    pub fn remove_title(&mut self, title_id: u32) {
        self.presence_title_records
            .retain(|r| r.title_id != title_id);
    }

    pub fn is_user_playing_title(&self, title_id: u32) -> bool {
        self.presence_title_records
            .iter()
            .any(|r| r.title_id == title_id && r.is_title_active)
    }
}

/// Which aspects of a user changed between two observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub presence: bool,
    pub profile: bool,
    pub relationship: bool,
}

impl ChangeFlags {
    pub fn any(&self) -> bool {
        self.presence || self.profile || self.relationship
    }
}

/// Per-user aggregate: profile, relationship flags and presence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialUser {
    pub xbox_user_id: XboxUserId,
    pub display_name: String,
    pub gamertag: String,
    pub display_pic_url: String,
    pub is_followed_by_caller: bool,
    pub is_following_user: bool,
    pub is_favorite: bool,
    pub presence: PresenceRecord,
}

impl SocialUser {
    /// Compares against a newer observation of the same user.
    pub fn diff(&self, newer: &SocialUser) -> ChangeFlags {
        ChangeFlags {
            presence: self.presence != newer.presence,
            profile: self.display_name != newer.display_name
                || self.gamertag != newer.gamertag
                || self.display_pic_url != newer.display_pic_url,
            relationship: self.is_followed_by_caller != newer.is_followed_by_caller
                || self.is_following_user != newer.is_following_user
                || self.is_favorite != newer.is_favorite,
        }
    }
}

/// Real-time device-presence delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevicePresenceChangeEventArgs {
    pub xbox_user_id: XboxUserId,
    pub device_type: PresenceDeviceType,
    pub is_user_logged_on_device: bool,
}

/// Real-time title-presence delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TitlePresenceChangeEventArgs {
    pub xbox_user_id: XboxUserId,
    pub title_id: u32,
    pub title_state: TitlePresenceState,
}

/// Real-time relationship delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocialRelationshipChangeEventArgs {
    pub social_notification: SocialNotificationType,
    pub xbox_user_ids: Vec<XboxUserId>,
}

/// Error reported by the real-time channel for one subscription.
#[derive(Clone, Debug)]
pub struct RtaSubscriptionErrorEventArgs {
    pub message: String,
}
