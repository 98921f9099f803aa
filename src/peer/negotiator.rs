//! Connection negotiator
//!
//! Owns the single active peer connection and drives the manual
//! offer/answer exchange: offer generation on the joining side, answer
//! generation on the meeting-owner side, and remote-description
//! application. Every exported description is finalized (full candidate
//! set) because each export path waits on the gathering barrier first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::gather::wait_gathering_complete;
use crate::codec::{NegotiationPayload, PayloadDirection};
use crate::config::CallConfig;
use crate::media::LocalMediaStream;
use crate::{Error, Result};

/// Which side of the exchange this party plays
///
/// The party joining an existing meeting initiates the exchange by
/// generating the offer; the party that created the meeting responds
/// with the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Generates the offer and consumes the answer
    Initiator,
    /// Consumes the offer and generates the answer
    Responder,
}

/// Externally observed connection health, mapped from the ICE connection
/// state of the active peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Connection created, no checks yet
    New,
    /// Connectivity checks in progress
    Checking,
    /// A usable path was found
    Connected,
    /// Checks finished, best path selected
    Completed,
    /// No path could be established
    Failed,
    /// A previously working path was lost
    Disconnected,
    /// Connection shut down
    Closed,
}

impl ConnectionHealth {
    /// Healthy terminal states: the call is up
    pub fn is_healthy_terminal(self) -> bool {
        matches!(self, ConnectionHealth::Connected | ConnectionHealth::Completed)
    }

    /// Failure states that force a hang-up
    pub fn is_failure(self) -> bool {
        matches!(self, ConnectionHealth::Failed | ConnectionHealth::Disconnected)
    }

    fn from_ice(state: RTCIceConnectionState) -> Option<Self> {
        match state {
            RTCIceConnectionState::New => Some(ConnectionHealth::New),
            RTCIceConnectionState::Checking => Some(ConnectionHealth::Checking),
            RTCIceConnectionState::Connected => Some(ConnectionHealth::Connected),
            RTCIceConnectionState::Completed => Some(ConnectionHealth::Completed),
            RTCIceConnectionState::Failed => Some(ConnectionHealth::Failed),
            RTCIceConnectionState::Disconnected => Some(ConnectionHealth::Disconnected),
            RTCIceConnectionState::Closed => Some(ConnectionHealth::Closed),
            RTCIceConnectionState::Unspecified => None,
        }
    }
}

/// Health observation from the connection created at `epoch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthEvent {
    /// Session epoch the observed connection belongs to
    pub epoch: u64,
    /// Reported health
    pub health: ConnectionHealth,
}

/// Remote track delivered by the connection created at `epoch`
#[derive(Clone)]
pub struct RemoteTrackEvent {
    /// Session epoch the track belongs to
    pub epoch: u64,
    /// The received track
    pub track: Arc<TrackRemote>,
}

struct ActivePeer {
    epoch: u64,
    role: CallRole,
    connection_id: String,
    pc: Arc<RTCPeerConnection>,
    // Retained so the attached tracks are not cleaned up under us
    _senders: Vec<Arc<RTCRtpSender>>,
}

/// Owns the single active peer connection and drives offer/answer
/// negotiation
///
/// Creating a replacement connection closes the prior one first, so at
/// most one connection is ever live. Each connection is stamped with a
/// monotonically increasing epoch; asynchronous steps re-check the epoch
/// after every suspension point before touching shared state, which keeps
/// a slow resolution from a torn-down connection from reviving stale data.
pub struct Negotiator {
    config: CallConfig,
    epoch: AtomicU64,
    active: RwLock<Option<ActivePeer>>,
    health_tx: mpsc::UnboundedSender<HealthEvent>,
    track_tx: mpsc::UnboundedSender<RemoteTrackEvent>,
}

impl Negotiator {
    /// Create a negotiator plus the receivers for its health and
    /// remote-track observations
    pub fn new(
        config: CallConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<HealthEvent>,
        mpsc::UnboundedReceiver<RemoteTrackEvent>,
    ) {
        let (health_tx, health_rx) = mpsc::unbounded_channel();
        let (track_tx, track_rx) = mpsc::unbounded_channel();

        (
            Self {
                config,
                epoch: AtomicU64::new(0),
                active: RwLock::new(None),
                health_tx,
                track_tx,
            },
            health_rx,
            track_rx,
        )
    }

    /// Epoch of the most recently created connection
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a connection is currently live
    pub async fn has_active(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Role of the active connection, if any
    pub async fn active_role(&self) -> Option<CallRole> {
        self.active.read().await.as_ref().map(|p| p.role)
    }

    /// Get the raw active peer connection
    ///
    /// Provides access to the underlying connection for rendering-side
    /// integration and tests.
    pub async fn active_peer_connection(&self) -> Option<Arc<RTCPeerConnection>> {
        self.active.read().await.as_ref().map(|p| Arc::clone(&p.pc))
    }

    /// Create the active peer connection for a new negotiation attempt
    ///
    /// Any prior connection is closed first; its pending barriers are
    /// invalidated by the epoch bump. Remote-track and health observers
    /// are registered before any negotiation call so no early event is
    /// missed, then the local tracks are attached. Returns the epoch of
    /// the new connection.
    pub async fn create_peer(&self, role: CallRole, local: &LocalMediaStream) -> Result<u64> {
        // No leaked handles: at most one connection at a time.
        self.teardown().await;

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer connection: role={:?}, epoch={}, connection_id={}",
            role, epoch, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::NegotiationFailure(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::NegotiationFailure(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.stun_servers.clone(),
                ..Default::default()
            }],
            ice_candidate_pool_size: self.config.ice_candidate_pool_size,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::NegotiationFailure(format!("Failed to create peer connection: {}", e))
        })?);

        // Observers must be in place before the first negotiation call,
        // otherwise early tracks or state changes are silently dropped.
        let track_tx = self.track_tx.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            Box::pin(async move {
                debug!("Remote track received: {} ({})", track.id(), track.kind());
                let _ = track_tx.send(RemoteTrackEvent { epoch, track });
            })
        }));

        let health_tx = self.health_tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |state| {
            let health_tx = health_tx.clone();
            Box::pin(async move {
                if let Some(health) = ConnectionHealth::from_ice(state) {
                    debug!("Connection health (epoch {}): {:?}", epoch, health);
                    let _ = health_tx.send(HealthEvent { epoch, health });
                }
            })
        }));

        let mut senders = Vec::with_capacity(local.tracks().len());
        for track in local.tracks() {
            let sender = match pc
                .add_track(Arc::clone(track.rtp()) as Arc<dyn TrackLocal + Send + Sync>)
                .await
            {
                Ok(sender) => sender,
                Err(e) => {
                    // The connection already spawned its background tasks;
                    // it must be closed even though it never became active.
                    if let Err(close_err) = pc.close().await {
                        warn!("Error closing unattached peer connection: {}", close_err);
                    }
                    return Err(Error::NegotiationFailure(format!(
                        "Failed to attach local track: {}",
                        e
                    )));
                }
            };
            senders.push(sender);
        }

        *self.active.write().await = Some(ActivePeer {
            epoch,
            role,
            connection_id,
            pc,
            _senders: senders,
        });

        Ok(epoch)
    }

    /// Generate the offer code for the active connection
    ///
    /// Sets the local description to a fresh offer, waits for ICE
    /// gathering to complete, and exports the finalized description.
    /// Candidates are appended incrementally after the initial offer, so
    /// only the post-barrier description is valid to share.
    pub async fn generate_offer(&self) -> Result<String> {
        let (epoch, pc) = self.active_pc().await?;

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| Error::NegotiationFailure(format!("Failed to create offer: {}", e)))?;

        pc.set_local_description(offer).await.map_err(|e| {
            Error::NegotiationFailure(format!("Failed to set local description: {}", e))
        })?;

        wait_gathering_complete(&pc, self.config.gather_timeout()).await?;
        self.ensure_current(epoch)?;

        let desc = self.finalized_local_description(&pc).await?;
        let code = NegotiationPayload::offer(desc.sdp).encode()?;

        info!("Offer generated (epoch {})", epoch);
        Ok(code)
    }

    /// Apply a pasted offer code and generate the answer code
    ///
    /// The payload is decoded and validated before anything touches the
    /// connection, so a bad paste leaves the session exactly as it was.
    pub async fn consume_offer_and_generate_answer(&self, code: &str) -> Result<String> {
        let payload = NegotiationPayload::decode(code)?;
        payload.expect_direction(PayloadDirection::Offer)?;

        let (epoch, pc) = self.active_pc().await?;

        let offer = RTCSessionDescription::offer(payload.description)
            .map_err(|e| Error::InvalidPayload(format!("The offer code is not usable: {}", e)))?;

        pc.set_remote_description(offer).await.map_err(|e| {
            Error::NegotiationFailure(format!("Failed to apply remote offer: {}", e))
        })?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationFailure(format!("Failed to create answer: {}", e)))?;

        pc.set_local_description(answer).await.map_err(|e| {
            Error::NegotiationFailure(format!("Failed to set local description: {}", e))
        })?;

        wait_gathering_complete(&pc, self.config.gather_timeout()).await?;
        self.ensure_current(epoch)?;

        let desc = self.finalized_local_description(&pc).await?;
        let code = NegotiationPayload::answer(desc.sdp).encode()?;

        info!("Answer generated (epoch {})", epoch);
        Ok(code)
    }

    /// Apply a pasted answer code to the active connection
    pub async fn consume_answer(&self, code: &str) -> Result<()> {
        let (epoch, pc) = self.active_pc().await?;

        let payload = NegotiationPayload::decode(code)?;
        payload.expect_direction(PayloadDirection::Answer)?;

        let answer = RTCSessionDescription::answer(payload.description)
            .map_err(|e| Error::InvalidPayload(format!("The answer code is not usable: {}", e)))?;

        pc.set_remote_description(answer).await.map_err(|e| {
            Error::NegotiationFailure(format!("Failed to apply remote answer: {}", e))
        })?;

        info!("Answer applied (epoch {})", epoch);
        Ok(())
    }

    /// Close and discard the active connection, if any
    ///
    /// Observers are replaced with no-ops before closing so a callback can
    /// never fire against a destroyed connection. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let peer = self.active.write().await.take();

        if let Some(peer) = peer {
            info!(
                "Closing peer connection: epoch={}, connection_id={}",
                peer.epoch, peer.connection_id
            );

            peer.pc.on_track(Box::new(|_, _, _| Box::pin(async {})));
            peer.pc
                .on_ice_connection_state_change(Box::new(|_| Box::pin(async {})));
            peer.pc
                .on_ice_gathering_state_change(Box::new(|_| Box::pin(async {})));

            if let Err(e) = peer.pc.close().await {
                warn!("Error closing peer connection: {}", e);
            }
        }
    }

    async fn active_pc(&self) -> Result<(u64, Arc<RTCPeerConnection>)> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|p| (p.epoch, Arc::clone(&p.pc)))
            .ok_or_else(|| {
                Error::NoActiveSession("No peer connection for this negotiation step".to_string())
            })
    }

    /// Reject resumption into a session that has been replaced
    pub(crate) fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.current_epoch() != epoch {
            return Err(Error::NegotiationFailure(format!(
                "Connection was replaced while negotiating (epoch {} superseded)",
                epoch
            )));
        }
        Ok(())
    }

    async fn finalized_local_description(
        &self,
        pc: &Arc<RTCPeerConnection>,
    ) -> Result<RTCSessionDescription> {
        pc.local_description().await.ok_or_else(|| {
            Error::NegotiationFailure("No local description after gathering".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaSource, SyntheticMediaSource};

    async fn negotiator_with_stream() -> (Negotiator, LocalMediaStream) {
        let (negotiator, _health_rx, _track_rx) = Negotiator::new(CallConfig::default());
        let local = SyntheticMediaSource::new().acquire().await.unwrap();
        (negotiator, local)
    }

    #[tokio::test]
    async fn test_no_active_session_initially() {
        let (negotiator, _health_rx, _track_rx) = Negotiator::new(CallConfig::default());
        assert!(!negotiator.has_active().await);
        assert_eq!(negotiator.current_epoch(), 0);

        let code = NegotiationPayload::answer("v=0\r\n").encode().unwrap();
        assert!(matches!(
            negotiator.consume_answer(&code).await,
            Err(Error::NoActiveSession(_))
        ));
    }

    #[tokio::test]
    async fn test_create_peer_sets_active_and_epoch() {
        let (negotiator, local) = negotiator_with_stream().await;

        let epoch = negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();

        assert_eq!(epoch, 1);
        assert!(negotiator.has_active().await);
        assert_eq!(negotiator.active_role().await, Some(CallRole::Initiator));
    }

    #[tokio::test]
    async fn test_at_most_one_active_connection() {
        let (negotiator, local) = negotiator_with_stream().await;

        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();
        let first = negotiator.active_peer_connection().await.unwrap();

        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();
        let second = negotiator.active_peer_connection().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            first.connection_state(),
            webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState::Closed
        );
        assert_eq!(negotiator.current_epoch(), 2);
    }

    #[tokio::test]
    async fn test_stale_epoch_is_rejected() {
        let (negotiator, local) = negotiator_with_stream().await;

        let first_epoch = negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();
        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();

        // A barrier registered against the first connection resolves late;
        // its resumption must not be allowed to continue.
        assert!(matches!(
            negotiator.ensure_current(first_epoch),
            Err(Error::NegotiationFailure(_))
        ));
        assert!(negotiator.ensure_current(2).is_ok());
    }

    #[tokio::test]
    async fn test_generate_offer_exports_offer_payload() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();

        let code = negotiator.generate_offer().await.unwrap();
        let payload = NegotiationPayload::decode(&code).unwrap();
        assert_eq!(payload.direction, PayloadDirection::Offer);
        assert!(payload.description.contains("audio"));
        assert!(payload.description.contains("video"));
    }

    #[tokio::test]
    async fn test_barrier_resolves_immediately_when_already_complete() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();
        negotiator.generate_offer().await.unwrap();

        // Gathering finished during offer generation; a fresh wait must
        // resolve without seeing any further event.
        let pc = negotiator.active_peer_connection().await.unwrap();
        super::wait_gathering_complete(&pc, std::time::Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_barrier_times_out_when_gathering_never_starts() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();

        // No local description was set, so gathering never begins and the
        // wait can only end via its bound.
        let pc = negotiator.active_peer_connection().await.unwrap();
        let err = super::wait_gathering_complete(&pc, std::time::Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NegotiationFailure(_)));
    }

    #[tokio::test]
    async fn test_consume_offer_rejects_bad_paste_without_side_effects() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Responder, &local)
            .await
            .unwrap();

        let err = negotiator
            .consume_offer_and_generate_answer("not-base64!!")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert!(negotiator.has_active().await);
    }

    #[tokio::test]
    async fn test_consume_offer_rejects_answer_payload() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Responder, &local)
            .await
            .unwrap();

        let code = NegotiationPayload::answer("v=0\r\n").encode().unwrap();
        assert!(matches!(
            negotiator.consume_offer_and_generate_answer(&code).await,
            Err(Error::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (negotiator, local) = negotiator_with_stream().await;
        negotiator
            .create_peer(CallRole::Initiator, &local)
            .await
            .unwrap();

        negotiator.teardown().await;
        assert!(!negotiator.has_active().await);
        negotiator.teardown().await;
        assert!(!negotiator.has_active().await);
    }

    #[tokio::test]
    async fn test_offer_answer_exchange_between_two_negotiators() {
        let (initiator, local_a) = negotiator_with_stream().await;
        let (responder, _hrx, _trx) = Negotiator::new(CallConfig::default());
        let local_b = SyntheticMediaSource::new().acquire().await.unwrap();

        initiator
            .create_peer(CallRole::Initiator, &local_a)
            .await
            .unwrap();
        let offer_code = initiator.generate_offer().await.unwrap();

        responder
            .create_peer(CallRole::Responder, &local_b)
            .await
            .unwrap();
        let answer_code = responder
            .consume_offer_and_generate_answer(&offer_code)
            .await
            .unwrap();

        let payload = NegotiationPayload::decode(&answer_code).unwrap();
        assert_eq!(payload.direction, PayloadDirection::Answer);

        initiator.consume_answer(&answer_code).await.unwrap();
    }
}
