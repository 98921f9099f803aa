//! Peer connection ownership and negotiation

mod gather;
mod negotiator;

pub use negotiator::{
    CallRole, ConnectionHealth, HealthEvent, Negotiator, RemoteTrackEvent,
};
