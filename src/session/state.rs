//! Call state machine
//!
//! States gate which user actions are valid. Every user action arrives as
//! a [`CallCommand`] message; the guard below is the single exhaustive
//! table deciding admissibility, so no rendering path can mutate the
//! session directly. `Connected` is deliberately absent from the outcomes
//! of any user action: it is reached only when connection health reports
//! a healthy terminal state, since path establishment can finish well
//! after the user pastes the answer.

/// Current call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Nothing started; media not acquired
    Idle,
    /// Local media acquired; the user can create or join a meeting
    MediaReady,
    /// Meeting created; waiting for the peer's offer code
    AwaitingPeerOffer,
    /// Join flow opened; waiting for the user to submit a meeting code
    EnterJoinCode,
    /// Offer exported; waiting for the peer's answer code
    AwaitingPeerAnswer,
    /// Connection health reported a healthy terminal state
    Connected,
    /// Media acquisition failed; restart required
    Error,
}

impl CallState {
    /// Whether a negotiation exchange is in flight
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            CallState::AwaitingPeerOffer | CallState::EnterJoinCode | CallState::AwaitingPeerAnswer
        )
    }

    /// Whether local media is held in this state
    pub fn has_media(self) -> bool {
        !matches!(self, CallState::Idle | CallState::Error)
    }

    /// Exhaustive admissibility table for user actions
    pub fn permits(self, command: &CallCommand) -> bool {
        match command {
            CallCommand::StartMedia => matches!(self, CallState::Idle | CallState::Error),
            CallCommand::CreateMeeting => matches!(self, CallState::MediaReady),
            CallCommand::OpenJoinPrompt => matches!(self, CallState::MediaReady),
            CallCommand::SubmitJoinCode(_) => matches!(self, CallState::EnterJoinCode),
            CallCommand::SubmitPeerOffer(_) => matches!(self, CallState::AwaitingPeerOffer),
            CallCommand::SubmitPeerAnswer(_) => matches!(self, CallState::AwaitingPeerAnswer),
            CallCommand::ToggleMic | CallCommand::ToggleCamera => self.has_media(),
            CallCommand::HangUp => true,
        }
    }
}

/// User actions, consumed as messages by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    /// Acquire camera and microphone
    StartMedia,
    /// Create a meeting and wait for the peer's offer
    CreateMeeting,
    /// Open the join-a-meeting prompt
    OpenJoinPrompt,
    /// Submit the meeting code and generate the offer
    SubmitJoinCode(String),
    /// Paste the peer's offer code and generate the answer
    SubmitPeerOffer(String),
    /// Paste the peer's answer code
    SubmitPeerAnswer(String),
    /// Flip microphone enablement
    ToggleMic,
    /// Flip camera enablement
    ToggleCamera,
    /// Tear everything down and return to Idle
    HangUp,
}
