//! Local and remote media stream handles
//!
//! The local stream is shared by the negotiator (transmission), the track
//! toggles (mute / camera off) and the render boundary (preview). Only the
//! session lifecycle may stop its tracks.

pub mod capture;
pub mod stream;

pub use capture::{MediaSource, SyntheticMediaSource};
pub use stream::{LocalMediaStream, LocalTrack, RemoteMediaStream, TrackKind};
