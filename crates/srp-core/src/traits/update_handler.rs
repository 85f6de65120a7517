// # Update Handler Trait
//
// Optional hook that sees every validated update before it is committed.
// The handler answers asynchronously with
// `Server::handle_service_update_result(id, result)`; results are
// committed in the order the updates were received. An update the
// handler does not answer within the configured timeout is committed
// with `UpdateError::ResponseTimeout`.
//
// Removals driven by lease expiry are also reported, with a fresh id,
// but the server does not wait for their result.

use std::fmt;
use std::time::Duration;

use crate::registry::Host;

/// Identifier of one update handed to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateId(pub u32);

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External handler of validated SRP updates
pub trait UpdateHandler: Send {
    /// Inspect `host` (the candidate, or a host being removed)
    ///
    /// Must not block. `timeout` is how long the server waits for the
    /// result before committing with a timeout error.
    fn handle_update(&mut self, id: UpdateId, host: &Host, timeout: Duration);
}
