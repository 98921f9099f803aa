//! # duocall
//!
//! Serverless two-party video call core built on WebRTC.
//!
//! There is no signaling server anywhere: the two parties negotiate a
//! direct connection by exchanging short text codes over any side channel
//! they already share (chat, email, a piece of paper). Each code is a
//! base64-wrapped JSON envelope carrying a finalized session description,
//! so a single paste per direction is enough to establish the call.
//!
//! ## Architecture
//!
//! - [`session`] - the call state machine and the [`CallSession`] facade
//!   that consumes user actions as [`CallCommand`] messages
//! - [`peer`] - ownership of the single active peer connection and the
//!   offer/answer negotiation steps
//! - [`codec`] - the negotiation payload envelope and its text encoding
//! - [`media`] - local/remote stream handles and the [`MediaSource`] seam
//!   for acquiring camera and microphone tracks
//! - [`config`] - STUN servers, candidate pooling and negotiation timeouts
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use duocall::{CallConfig, CallSession, SyntheticMediaSource};
//!
//! #[tokio::main]
//! async fn main() -> duocall::Result<()> {
//!     let session = CallSession::new(
//!         CallConfig::default(),
//!         Arc::new(SyntheticMediaSource::new()),
//!     )?;
//!
//!     session.start_media().await?;
//!     session.create_meeting().await?;
//!     println!("Share this meeting code: {}", session.meeting_code().await);
//!
//!     // Paste the peer's offer code when it arrives, then share the
//!     // generated answer code back.
//!     // session.submit_peer_offer(&pasted).await?;
//!     // println!("{}", session.export_code().await);
//!
//!     loop {
//!         session.pump_events().await;
//!         tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod meeting;
pub mod peer;
pub mod session;

pub use codec::{NegotiationPayload, PayloadDirection};
pub use config::CallConfig;
pub use error::{Error, Result};
pub use media::{
    LocalMediaStream, LocalTrack, MediaSource, RemoteMediaStream, SyntheticMediaSource, TrackKind,
};
pub use meeting::generate_meeting_code;
pub use peer::{CallRole, ConnectionHealth, HealthEvent, Negotiator, RemoteTrackEvent};
pub use session::{CallCommand, CallSession, CallState};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
