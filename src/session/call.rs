//! Call session facade
//!
//! Owns the negotiator, the state machine and all session-scoped data.
//! The rendering layer submits [`CallCommand`] messages and reads back
//! pure state: current [`CallState`], stream handles, the exportable
//! negotiation code and the user-visible notice. Connection-health and
//! remote-track observations arrive on channels and are folded in by
//! [`CallSession::pump_events`].

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};
use webrtc::track::track_remote::TrackRemote;

use super::state::{CallCommand, CallState};
use crate::codec::{NegotiationPayload, PayloadDirection};
use crate::config::CallConfig;
use crate::media::{LocalMediaStream, MediaSource, RemoteMediaStream, TrackKind};
use crate::meeting::generate_meeting_code;
use crate::peer::{CallRole, HealthEvent, Negotiator, RemoteTrackEvent};
use crate::{Error, Result};

struct CallShared {
    state: CallState,
    meeting_code: String,
    local: Option<LocalMediaStream>,
    /// Code this side exports: the offer (initiator) or answer (responder)
    export_code: String,
    /// Last accepted pasted code from the peer
    peer_code: String,
    mic_enabled: bool,
    camera_enabled: bool,
    notice: Option<String>,
}

impl CallShared {
    fn new() -> Self {
        Self {
            state: CallState::Idle,
            meeting_code: String::new(),
            local: None,
            export_code: String::new(),
            peer_code: String::new(),
            mic_enabled: true,
            camera_enabled: true,
            notice: None,
        }
    }
}

/// A two-party call session driven by manual code exchange
pub struct CallSession {
    config: CallConfig,
    source: Arc<dyn MediaSource>,
    negotiator: Negotiator,
    shared: RwLock<CallShared>,
    remote: RemoteMediaStream,
    health_rx: Mutex<mpsc::UnboundedReceiver<HealthEvent>>,
    track_rx: Mutex<mpsc::UnboundedReceiver<RemoteTrackEvent>>,
}

impl CallSession {
    /// Create a session with the given media source
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: CallConfig, source: Arc<dyn MediaSource>) -> Result<Self> {
        config.validate()?;

        let (negotiator, health_rx, track_rx) = Negotiator::new(config.clone());

        Ok(Self {
            config,
            source,
            negotiator,
            shared: RwLock::new(CallShared::new()),
            remote: RemoteMediaStream::new(),
            health_rx: Mutex::new(health_rx),
            track_rx: Mutex::new(track_rx),
        })
    }

    /// Consume one user action
    ///
    /// The command is rejected with [`Error::InvalidAction`] when the
    /// current state does not permit it. Any failure is recorded as the
    /// user-visible notice; a successful command clears it. Failures for
    /// which [`Error::forces_hang_up`] holds tear the whole session down
    /// first: recovery from them is restart-from-scratch, never a partial
    /// retry.
    pub async fn handle(&self, command: CallCommand) -> Result<()> {
        {
            let shared = self.shared.read().await;
            if !shared.state.permits(&command) {
                let err = Error::InvalidAction(format!(
                    "{:?} is not available in state {:?}",
                    command, shared.state
                ));
                drop(shared);
                self.set_notice(err.to_string()).await;
                return Err(err);
            }
        }

        let result = match command {
            CallCommand::StartMedia => self.do_start_media().await,
            CallCommand::CreateMeeting => self.do_create_meeting().await,
            CallCommand::OpenJoinPrompt => self.do_open_join_prompt().await,
            CallCommand::SubmitJoinCode(code) => self.do_submit_join_code(&code).await,
            CallCommand::SubmitPeerOffer(code) => self.do_submit_peer_offer(&code).await,
            CallCommand::SubmitPeerAnswer(code) => self.do_submit_peer_answer(&code).await,
            CallCommand::ToggleMic => self.do_toggle(TrackKind::Audio).await,
            CallCommand::ToggleCamera => self.do_toggle(TrackKind::Video).await,
            CallCommand::HangUp => {
                self.reset_to_idle().await;
                Ok(())
            }
        };

        match &result {
            Ok(()) => self.shared.write().await.notice = None,
            Err(e) => {
                if e.forces_hang_up() {
                    self.reset_to_idle().await;
                }
                self.set_notice(e.to_string()).await;
            }
        }

        result
    }

    /// Acquire camera and microphone
    pub async fn start_media(&self) -> Result<()> {
        self.handle(CallCommand::StartMedia).await
    }

    /// Create a meeting and wait for the peer's offer code
    pub async fn create_meeting(&self) -> Result<()> {
        self.handle(CallCommand::CreateMeeting).await
    }

    /// Open the join-a-meeting prompt
    pub async fn open_join_prompt(&self) -> Result<()> {
        self.handle(CallCommand::OpenJoinPrompt).await
    }

    /// Submit the meeting code; generates and exports the offer
    pub async fn submit_join_code(&self, code: &str) -> Result<()> {
        self.handle(CallCommand::SubmitJoinCode(code.to_string())).await
    }

    /// Paste the peer's offer code; generates and exports the answer
    pub async fn submit_peer_offer(&self, code: &str) -> Result<()> {
        self.handle(CallCommand::SubmitPeerOffer(code.to_string())).await
    }

    /// Paste the peer's answer code
    pub async fn submit_peer_answer(&self, code: &str) -> Result<()> {
        self.handle(CallCommand::SubmitPeerAnswer(code.to_string())).await
    }

    /// Flip microphone enablement
    pub async fn toggle_mic(&self) -> Result<()> {
        self.handle(CallCommand::ToggleMic).await
    }

    /// Flip camera enablement
    pub async fn toggle_camera(&self) -> Result<()> {
        self.handle(CallCommand::ToggleCamera).await
    }

    /// Tear everything down and return to Idle; idempotent
    pub async fn hang_up(&self) {
        // HangUp is permitted in every state, so this cannot fail.
        let _ = self.handle(CallCommand::HangUp).await;
    }

    /// Fold in any pending connection-health and remote-track events
    ///
    /// Call this from the driving loop. Health transitions are what move
    /// the session to `Connected`, and what force a hang-up with a notice
    /// when the connection fails.
    pub async fn pump_events(&self) {
        let health: Vec<HealthEvent> = {
            let mut rx = self.health_rx.lock().await;
            let mut drained = Vec::new();
            while let Ok(ev) = rx.try_recv() {
                drained.push(ev);
            }
            drained
        };
        for ev in health {
            self.apply_health(ev).await;
        }

        let tracks: Vec<RemoteTrackEvent> = {
            let mut rx = self.track_rx.lock().await;
            let mut drained = Vec::new();
            while let Ok(ev) = rx.try_recv() {
                drained.push(ev);
            }
            drained
        };
        for ev in tracks {
            self.apply_remote_track(ev).await;
        }
    }

    // ---- Observable state ----

    /// Current state-machine value
    pub async fn state(&self) -> CallState {
        self.shared.read().await.state
    }

    /// Current meeting code (empty outside a meeting)
    pub async fn meeting_code(&self) -> String {
        self.shared.read().await.meeting_code.clone()
    }

    /// Negotiation code this side should share, if any
    pub async fn export_code(&self) -> String {
        self.shared.read().await.export_code.clone()
    }

    /// Last accepted peer code
    pub async fn peer_code(&self) -> String {
        self.shared.read().await.peer_code.clone()
    }

    /// User-visible notice from the last failure, if any
    pub async fn notice(&self) -> Option<String> {
        self.shared.read().await.notice.clone()
    }

    /// Whether the microphone is enabled
    pub async fn mic_enabled(&self) -> bool {
        self.shared.read().await.mic_enabled
    }

    /// Whether the camera is enabled
    pub async fn camera_enabled(&self) -> bool {
        self.shared.read().await.camera_enabled
    }

    /// Local stream handle for preview rendering
    pub async fn local_stream(&self) -> Option<LocalMediaStream> {
        self.shared.read().await.local.clone()
    }

    /// Remote tracks received so far, for rendering
    pub fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.remote.tracks()
    }

    // ---- Command implementations ----

    async fn do_start_media(&self) -> Result<()> {
        match self.source.acquire().await {
            Ok(local) => {
                let mut shared = self.shared.write().await;
                shared.local = Some(local);
                shared.mic_enabled = true;
                shared.camera_enabled = true;
                shared.state = CallState::MediaReady;
                info!("Media acquired, session ready");
                Ok(())
            }
            Err(e) => {
                self.shared.write().await.state = CallState::Error;
                warn!("Media acquisition failed: {}", e);
                Err(match e {
                    Error::MediaAccessDenied(_) => e,
                    other => Error::MediaAccessDenied(other.to_string()),
                })
            }
        }
    }

    async fn do_create_meeting(&self) -> Result<()> {
        let code = generate_meeting_code(self.config.meeting_code_length);
        let mut shared = self.shared.write().await;
        shared.meeting_code = code;
        shared.state = CallState::AwaitingPeerOffer;
        info!("Meeting created: {}", shared.meeting_code);
        Ok(())
    }

    async fn do_open_join_prompt(&self) -> Result<()> {
        self.shared.write().await.state = CallState::EnterJoinCode;
        Ok(())
    }

    async fn do_submit_join_code(&self, code: &str) -> Result<()> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidAction("Enter a meeting code".to_string()));
        }

        let local = self.local_or_bug().await?;
        self.shared.write().await.meeting_code = trimmed.to_string();

        self.negotiator.create_peer(CallRole::Initiator, &local).await?;
        let offer_code = self.negotiator.generate_offer().await?;

        let mut shared = self.shared.write().await;
        shared.export_code = offer_code;
        shared.state = CallState::AwaitingPeerAnswer;
        Ok(())
    }

    async fn do_submit_peer_offer(&self, code: &str) -> Result<()> {
        let trimmed = code.trim().to_string();
        if trimmed.is_empty() {
            return Err(Error::InvalidAction(
                "Paste the peer's offer code".to_string(),
            ));
        }

        // Validate the paste before creating a connection for it; a bad
        // code must leave the session exactly as it was.
        if let Err(e) = NegotiationPayload::decode(&trimmed)
            .and_then(|p| p.expect_direction(PayloadDirection::Offer))
        {
            self.shared.write().await.peer_code.clear();
            return Err(e);
        }

        let local = self.local_or_bug().await?;
        self.negotiator.create_peer(CallRole::Responder, &local).await?;
        match self
            .negotiator
            .consume_offer_and_generate_answer(&trimmed)
            .await
        {
            Ok(answer_code) => {
                // The answer becomes exportable while the state stays
                // AwaitingPeerOffer; connection health decides the rest.
                let mut shared = self.shared.write().await;
                shared.peer_code = trimmed;
                shared.export_code = answer_code;
                Ok(())
            }
            Err(e @ Error::InvalidPayload(_)) => {
                self.shared.write().await.peer_code.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn do_submit_peer_answer(&self, code: &str) -> Result<()> {
        let trimmed = code.trim().to_string();
        if trimmed.is_empty() {
            return Err(Error::InvalidAction(
                "Paste the peer's answer code".to_string(),
            ));
        }

        match self.negotiator.consume_answer(&trimmed).await {
            Ok(()) => {
                // Not Connected yet: the paste only finishes the exchange.
                // Path establishment is reported by the health observer.
                self.shared.write().await.peer_code = trimmed;
                Ok(())
            }
            Err(e @ Error::InvalidPayload(_)) => {
                self.shared.write().await.peer_code.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn do_toggle(&self, kind: TrackKind) -> Result<()> {
        let mut shared = self.shared.write().await;
        let local = shared.local.as_ref().cloned().ok_or_else(|| {
            Error::InvalidAction("No local media to toggle".to_string())
        })?;

        let enabled = match kind {
            TrackKind::Audio => {
                shared.mic_enabled = !shared.mic_enabled;
                shared.mic_enabled
            }
            TrackKind::Video => {
                shared.camera_enabled = !shared.camera_enabled;
                shared.camera_enabled
            }
        };
        local.set_kind_enabled(kind, enabled);
        Ok(())
    }

    // ---- Lifecycle and events ----

    /// Close the connection, stop every track and clear all session
    /// fields back to their defaults
    async fn reset_to_idle(&self) {
        self.negotiator.teardown().await;

        let mut shared = self.shared.write().await;
        if let Some(local) = shared.local.take() {
            local.stop_all();
        }
        self.remote.clear();

        shared.state = CallState::Idle;
        shared.meeting_code.clear();
        shared.export_code.clear();
        shared.peer_code.clear();
        shared.mic_enabled = true;
        shared.camera_enabled = true;
        shared.notice = None;

        info!("Session reset to Idle");
    }

    async fn apply_health(&self, ev: HealthEvent) {
        // Health from a replaced connection must not touch current state.
        if ev.epoch != self.negotiator.current_epoch() {
            return;
        }

        if ev.health.is_healthy_terminal() {
            let mut shared = self.shared.write().await;
            if matches!(
                shared.state,
                CallState::AwaitingPeerOffer | CallState::AwaitingPeerAnswer
            ) {
                shared.state = CallState::Connected;
                info!("Connection established, call is up");
            }
        } else if ev.health.is_failure() {
            let was_active = self.shared.read().await.state != CallState::Idle;
            if was_active {
                warn!("Connection health reported {:?}, hanging up", ev.health);
                self.reset_to_idle().await;
                self.set_notice(
                    Error::ConnectivityFailure(
                        "The connection was lost; start a new meeting to retry".to_string(),
                    )
                    .to_string(),
                )
                .await;
            }
        }
    }

    async fn apply_remote_track(&self, ev: RemoteTrackEvent) {
        if ev.epoch != self.negotiator.current_epoch() {
            return;
        }
        self.remote.push(ev.track);
    }

    async fn set_notice(&self, notice: String) {
        self.shared.write().await.notice = Some(notice);
    }

    async fn local_or_bug(&self) -> Result<LocalMediaStream> {
        self.shared.read().await.local.clone().ok_or_else(|| {
            Error::NoActiveSession("Local media missing for a gated action".to_string())
        })
    }
}
