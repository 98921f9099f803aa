//! Media stream and track handles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

/// A local media track with a mute flag
///
/// The `enabled` flag is purely local state consulted by whatever feeds
/// samples into the RTP track; flipping it never touches the peer
/// connection and never triggers renegotiation. `stopped` is terminal and
/// only set by session teardown.
pub struct LocalTrack {
    kind: TrackKind,
    rtp: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalTrack {
    /// Wrap an RTP track as a local track of the given kind
    pub fn new(kind: TrackKind, rtp: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            rtp,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Get the track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Get the underlying RTP track for attachment to a peer connection
    pub fn rtp(&self) -> &Arc<TrackLocalStaticSample> {
        &self.rtp
    }

    /// Whether samples should currently be fed into this track
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Set the enabled flag
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether the track has been stopped by teardown
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the track. Capture must cease feeding samples after this.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Combined audio+video local stream handle
#[derive(Clone)]
pub struct LocalMediaStream {
    stream_id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl LocalMediaStream {
    /// Build a stream from its tracks
    pub fn new(stream_id: String, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self { stream_id, tracks }
    }

    /// Get the stream identifier
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// All tracks in this stream
    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    /// Tracks of one kind
    pub fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<LocalTrack>> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Flip the enabled flag on every track of the given kind
    pub fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
        debug!("Local {:?} tracks enabled={}", kind, enabled);
    }

    /// Stop every track in the stream
    pub(crate) fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
        debug!("Stopped all tracks of stream {}", self.stream_id);
    }
}

/// Remote media stream handle
///
/// Collects the remote tracks delivered by the peer connection's track
/// observer. Dropping the handles is sufficient to release them; inbound
/// RTP ceases when the owning connection closes.
pub struct RemoteMediaStream {
    tracks: RwLock<Vec<Arc<TrackRemote>>>,
}

impl RemoteMediaStream {
    /// Create an empty remote stream
    pub fn new() -> Self {
        Self {
            tracks: RwLock::new(Vec::new()),
        }
    }

    /// Record a newly received remote track
    pub fn push(&self, track: Arc<TrackRemote>) {
        debug!("Remote track received: {}", track.id());
        self.tracks.write().push(track);
    }

    /// Snapshot of the received remote tracks, for rendering
    pub fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.tracks.read().clone()
    }

    /// Whether any remote track has arrived yet
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Drop all remote track handles
    pub(crate) fn clear(&self) {
        self.tracks.write().clear();
    }
}

impl Default for RemoteMediaStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

    fn audio_track() -> Arc<LocalTrack> {
        Arc::new(LocalTrack::new(
            TrackKind::Audio,
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    ..Default::default()
                },
                "audio".to_string(),
                "stream".to_string(),
            )),
        ))
    }

    fn video_track() -> Arc<LocalTrack> {
        Arc::new(LocalTrack::new(
            TrackKind::Video,
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_string(),
                    ..Default::default()
                },
                "video".to_string(),
                "stream".to_string(),
            )),
        ))
    }

    #[test]
    fn test_tracks_start_enabled() {
        let stream = LocalMediaStream::new("s".to_string(), vec![audio_track(), video_track()]);
        assert!(stream.tracks().iter().all(|t| t.is_enabled()));
        assert!(stream.tracks().iter().all(|t| !t.is_stopped()));
    }

    #[test]
    fn test_set_kind_enabled_only_touches_kind() {
        let stream = LocalMediaStream::new("s".to_string(), vec![audio_track(), video_track()]);

        stream.set_kind_enabled(TrackKind::Audio, false);
        assert!(!stream.tracks_of(TrackKind::Audio)[0].is_enabled());
        assert!(stream.tracks_of(TrackKind::Video)[0].is_enabled());

        stream.set_kind_enabled(TrackKind::Audio, true);
        assert!(stream.tracks_of(TrackKind::Audio)[0].is_enabled());
    }

    #[test]
    fn test_stop_all() {
        let stream = LocalMediaStream::new("s".to_string(), vec![audio_track(), video_track()]);
        stream.stop_all();
        assert!(stream.tracks().iter().all(|t| t.is_stopped()));
    }

    #[test]
    fn test_remote_stream_starts_empty() {
        let remote = RemoteMediaStream::new();
        assert!(remote.is_empty());
        assert!(remote.tracks().is_empty());
    }
}
