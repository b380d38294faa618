//! Realtime fan-out

pub mod broadcaster;
pub mod hub;

pub use broadcaster::{
    BroadcastError, BroadcastEvent, Broadcaster, CaptureBroadcaster, NoopBroadcaster,
};
pub use hub::{Frame, HubClient, RealtimeHub};
