//! Contracts of the external collaborators.
//!
//! The engine owns none of the transports: PeopleHub fetches, presence and
//! social subscriptions and the real-time channel are reached through these
//! traits. Tests supply scripted mocks; production wires real services.

use crate::error::SocialResult;
use crate::subscriptions::SubscriptionHandle;
use crate::types::{
    DevicePresenceChangeEventArgs, PresenceDetailLevel, PresenceDeviceType, PresenceRecord,
    RtaConnectionState, RtaSubscriptionErrorEventArgs, SocialManagerExtraDetailLevel,
    SocialRelationshipChangeEventArgs, SocialUser, TitlePresenceChangeEventArgs, XboxUserId,
};
use async_trait::async_trait;

/// REST graph-fetch service.
#[async_trait]
pub trait PeopleHubClient: Send + Sync {
    /// Fetches social users for the caller. With `ids = None` the full
    /// followed-users list is returned; otherwise only the named users.
    async fn get_social_graph(
        &self,
        caller: XboxUserId,
        detail: SocialManagerExtraDetailLevel,
        ids: Option<&[XboxUserId]>,
    ) -> SocialResult<Vec<SocialUser>>;
}

/// Presence REST + subscription service.
#[async_trait]
pub trait PresenceClient: Send + Sync {
    async fn subscribe_to_device_presence_change(
        &self,
        xuid: XboxUserId,
    ) -> SocialResult<SubscriptionHandle>;

    async fn subscribe_to_title_presence_change(
        &self,
        xuid: XboxUserId,
        title_id: u32,
    ) -> SocialResult<SubscriptionHandle>;

    async fn unsubscribe_from_device_presence_change(
        &self,
        handle: SubscriptionHandle,
    ) -> SocialResult<()>;

    async fn unsubscribe_from_title_presence_change(
        &self,
        handle: SubscriptionHandle,
    ) -> SocialResult<()>;

    async fn get_presence_for_multiple_users(
        &self,
        xuids: &[XboxUserId],
        device_filter: &[PresenceDeviceType],
        title_filter: &[u32],
        detail: PresenceDetailLevel,
    ) -> SocialResult<Vec<PresenceRecord>>;
}

/// Social relationship subscription service.
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn subscribe_to_social_relationship_change(
        &self,
        xuid: XboxUserId,
    ) -> SocialResult<SubscriptionHandle>;

    async fn unsubscribe_from_social_relationship_change(
        &self,
        handle: SubscriptionHandle,
    ) -> SocialResult<()>;
}

/// Event delivered on the multiplexed real-time activity channel.
#[derive(Clone, Debug)]
pub enum RtaEvent {
    ConnectionStateChanged(RtaConnectionState),
    Resync,
    SubscriptionError(RtaSubscriptionErrorEventArgs),
    DevicePresenceChanged(DevicePresenceChangeEventArgs),
    TitlePresenceChanged(TitlePresenceChangeEventArgs),
    SocialRelationshipChanged(SocialRelationshipChangeEventArgs),
}

/// Real-time activity channel.
#[async_trait]
pub trait RtaClient: Send + Sync {
    async fn activate(&self) -> SocialResult<()>;

    async fn deactivate(&self);

    /// Awaits the next pushed event; `None` once the channel is closed.
    async fn next_event(&self) -> Option<RtaEvent>;
}
