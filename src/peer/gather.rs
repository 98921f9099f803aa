//! ICE-gathering completion barrier
//!
//! Negotiation codes are exchanged in one shot, so a local description may
//! only be exported once the full candidate set is embedded in it. This
//! barrier suspends until the connection's gathering state reaches its
//! terminal Complete value, resolving immediately if it is already there
//! (no missed wake-up), and at most once otherwise.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::{Error, Result};

/// Wait until ICE gathering for `pc` is complete, bounded by `timeout`
///
/// The wait is keyed to this specific connection instance; callers that
/// replace the connection while a wait is pending must re-check their
/// session epoch after resuming, since a late resolution here says nothing
/// about the connection that is active now.
pub(crate) async fn wait_gathering_complete(
    pc: &Arc<RTCPeerConnection>,
    timeout: Duration,
) -> Result<()> {
    if pc.ice_gathering_state() == RTCIceGatheringState::Complete {
        debug!("ICE gathering already complete, barrier resolves immediately");
        return Ok(());
    }

    let (tx, rx) = oneshot::channel::<()>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        let tx = tx.clone();
        Box::pin(async move {
            if state == RTCIceGathererState::Complete {
                if let Ok(mut guard) = tx.lock() {
                    if let Some(tx) = guard.take() {
                        let _ = tx.send(());
                    }
                }
            }
        })
    }));

    // Gathering may have finished between the first check and handler
    // registration; the handler would then never fire.
    if pc.ice_gathering_state() == RTCIceGatheringState::Complete {
        return Ok(());
    }

    tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| {
            Error::NegotiationFailure(format!(
                "ICE gathering did not complete within {:?}; the network may be blocking discovery",
                timeout
            ))
        })?
        .map_err(|_| {
            Error::NegotiationFailure("Connection was torn down while gathering".to_string())
        })?;

    debug!("ICE gathering complete");
    Ok(())
}
