//! Negotiation payload codec
//!
//! Converts between the structured negotiation document and the opaque
//! shareable text code the two parties paste to each other. The encoding is
//! canonical JSON wrapped in standard base64, so every byte of the transport
//! description survives the round trip, including non-ASCII text that can
//! legitimately appear in SDP free-form fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which half of the negotiation exchange a payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadDirection {
    /// Produced by the initiating party
    Offer,
    /// Produced by the responding party
    Answer,
}

impl PayloadDirection {
    /// Wire-format tag for this direction
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadDirection::Offer => "offer",
            PayloadDirection::Answer => "answer",
        }
    }
}

/// Structured negotiation document exchanged out of band
///
/// The `description` is the complete transport description (SDP) with the
/// full candidate set already embedded; it is only valid to construct one
/// after ICE gathering has reported complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationPayload {
    /// Offer or answer tag
    pub direction: PayloadDirection,

    /// Full transport-description text, post-gathering
    pub description: String,
}

impl NegotiationPayload {
    /// Build an offer payload
    pub fn offer(description: impl Into<String>) -> Self {
        Self {
            direction: PayloadDirection::Offer,
            description: description.into(),
        }
    }

    /// Build an answer payload
    pub fn answer(description: impl Into<String>) -> Self {
        Self {
            direction: PayloadDirection::Answer,
            description: description.into(),
        }
    }

    /// Encode this payload into an opaque shareable text code
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| {
            Error::NegotiationFailure(format!("Failed to serialize negotiation payload: {}", e))
        })?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a pasted text code back into a payload
    ///
    /// Surrounding whitespace is tolerated (pasted codes often pick up a
    /// trailing newline). Any malformed input yields [`Error::InvalidPayload`];
    /// decode failures are user-correctable, never fatal.
    pub fn decode(code: &str) -> Result<Self> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPayload("The code is empty".to_string()));
        }

        let bytes = STANDARD.decode(trimmed).map_err(|e| {
            Error::InvalidPayload(format!("The code is not valid base64: {}", e))
        })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::InvalidPayload(format!("The code does not decode to a negotiation document: {}", e))
        })
    }

    /// Require a specific direction tag, e.g. an offer where an offer is
    /// expected. A mismatch means the user pasted the wrong code and is
    /// surfaced as [`Error::InvalidPayload`].
    pub fn expect_direction(&self, direction: PayloadDirection) -> Result<()> {
        if self.direction != direction {
            return Err(Error::InvalidPayload(format!(
                "Expected an {} code but got an {} code",
                direction.as_str(),
                self.direction.as_str()
            )));
        }
        Ok(())
    }
}
