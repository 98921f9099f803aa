//! Device-capture seam
//!
//! Real capture (camera, microphone) lives outside this crate. The session
//! only needs something that yields a combined audio+video local stream, so
//! the boundary is a trait; a failing implementation maps to the
//! `MediaAccessDenied` flow exactly as a denied permission prompt would.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::stream::{LocalMediaStream, LocalTrack, TrackKind};
use crate::Result;

/// Source of the combined local audio+video stream
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the local stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccessDenied`](crate::Error::MediaAccessDenied)
    /// when capture permission or devices are unavailable.
    async fn acquire(&self) -> Result<LocalMediaStream>;
}

/// Media source that fabricates one Opus audio track and one VP8 video
/// track without touching any device
///
/// The tracks are real RTP tracks a peer connection can negotiate and send
/// on; whatever drives capture feeds samples into them at the render
/// boundary. Also the default source for tests.
pub struct SyntheticMediaSource;

impl SyntheticMediaSource {
    /// Create a synthetic source
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self) -> Result<LocalMediaStream> {
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());

        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            format!("audio-{}", uuid::Uuid::new_v4()),
            stream_id.clone(),
        ));

        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: 90_000,
                ..Default::default()
            },
            format!("video-{}", uuid::Uuid::new_v4()),
            stream_id.clone(),
        ));

        info!("Acquired local media stream {}", stream_id);

        Ok(LocalMediaStream::new(
            stream_id,
            vec![
                Arc::new(LocalTrack::new(TrackKind::Audio, audio)),
                Arc::new(LocalTrack::new(TrackKind::Video, video)),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_source_yields_audio_and_video() {
        let source = SyntheticMediaSource::new();
        let stream = source.acquire().await.unwrap();

        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(stream.tracks_of(TrackKind::Audio).len(), 1);
        assert_eq!(stream.tracks_of(TrackKind::Video).len(), 1);
        assert!(!stream.stream_id().is_empty());
    }

    #[tokio::test]
    async fn test_synthetic_source_yields_distinct_streams() {
        let source = SyntheticMediaSource::new();
        let a = source.acquire().await.unwrap();
        let b = source.acquire().await.unwrap();
        assert_ne!(a.stream_id(), b.stream_id());
    }
}
