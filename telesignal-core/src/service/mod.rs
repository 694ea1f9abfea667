pub mod presence;
pub mod session;
pub mod signaling;
pub mod store;

pub use presence::{
    PresenceBroadcaster, PresenceEvent, PresenceSink, PresenceSubscription, SinkClosed,
};
pub use session::{CleanupReason, JoinOutcome, LeaveOutcome, RoomTimeouts, SessionManager};
pub use signaling::SignalingRelay;
pub use store::{RoomStore, SharedRoom};
