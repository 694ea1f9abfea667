pub mod id;
pub mod room;

pub use id::{ParticipantId, RoomId};
pub use room::{
    age_of, ArmedTimer, ClearedSignaling, DescriptionKind, IceCandidateEntry, Participant,
    ParticipantStatus, ParticipantSummary, Room, RoomExpiration, RoomInfo, RoomStatus,
    SessionData, SignalEntry, TimerKind,
};
