//! Server sessions and their request correlation.
//!
//! A [`ServerSession`] owns at most one live connection. Its receive loop
//! routes responses through the [`RequestCorrelator`] and reports transport
//! failure back to the session; nothing else mutates session state.

mod correlator;
mod error;
mod receive;
mod server_session;

pub use correlator::{CallOutcome, CorrelationError, PendingCall, RequestCorrelator};
pub use error::{InvocationError, RemoteError, SessionError};
pub use server_session::{ConnectOutcome, ServerSession};
