//! Client-side social graph engine.
//!
//! Maintains a locally cached, eventually-consistent projection of a user's
//! social relationships (friends and favorites) enriched with presence and
//! profile data, and delivers it to an interactive application through a
//! frame-pumped, non-blocking API:
//! - Deltas from the REST graph-fetch service (PeopleHub), the real-time
//!   activity channel and application calls land on one internal FIFO queue.
//! - A worker applies them to the inactive half of a double-buffered store;
//!   `do_work` swaps the buffers once per frame and hands out a coherent
//!   snapshot plus the accumulated public events.
//! - Call-buffer timers debounce outbound service calls; a periodic refresh
//!   diffs against the authoritative graph and converges after disconnects.

pub mod buffer;
pub mod call_timer;
pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod peoplehub;
pub mod refresh;
pub mod subscriptions;
pub mod types;

pub use buffer::{BufferPair, DecrefOutcome, GraphSnapshot, UserBuffer, UserContext};
pub use call_timer::CallBufferTimer;
pub use clients::{PeopleHubClient, PresenceClient, RtaClient, RtaEvent, SocialClient};
pub use config::SocialManagerConfig;
pub use error::{SocialError, SocialResult};
pub use events::{CompletionContext, InternalEvent, SocialEvent, SocialEventType};
pub use graph::{ChangeStruct, GraphState, SocialGraphCore};
pub use peoplehub::PeopleHubService;
pub use refresh::{diff_graphs, GraphDelta};
pub use subscriptions::{SubscriptionHandle, SubscriptionTable, UserSubscriptions};
pub use types::{
    ChangeFlags, DevicePresenceChangeEventArgs, PresenceDetailLevel, PresenceDeviceType,
    PresenceRecord, RtaConnectionState, RtaSubscriptionErrorEventArgs,
    SocialManagerExtraDetailLevel, SocialNotificationType, SocialRelationshipChangeEventArgs,
    SocialUser, TitlePresenceChangeEventArgs, TitlePresenceState, TitleRecord, UserPresenceState,
    XboxUserId,
};
