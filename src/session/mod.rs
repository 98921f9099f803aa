//! Call session state machine and command surface

mod call;
mod state;

pub use call::CallSession;
pub use state::{CallCommand, CallState};
