// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Default destination lookup.
//
// Order: the session cache, then LPDEST / PRINTER from the environment
// (captured when the session was created, never for an elevated process),
// then a CUPS-Get-Default round trip. Having no default is a valid answer,
// so lookup failures are recorded in the last-error state and reported as
// `None`.

use std::rc::Rc;

use spoolwire_core::types::StatusCode;
use tracing::{debug, instrument, warn};

use crate::decode::decode_default_destination;
use crate::dirs::Environment;
use crate::request::default_destination_request;
use crate::session::{SessionHandle, acquire_context};

/// The value of `PRINTER` that means "no preference".
const PRINTER_PLACEHOLDER: &str = "lp";

/// Default destination named by the environment, if any.
pub(crate) fn from_environment<E: Environment + ?Sized>(env: &E) -> Option<String> {
    if env.is_elevated() {
        return None;
    }
    env.var("LPDEST")
        .or_else(|| env.var("PRINTER").filter(|p| p != PRINTER_PLACEHOLDER))
}

impl SessionHandle {
    /// This session's default destination, resolved once and then cached.
    #[instrument(skip(self), fields(context = %self.id()))]
    pub fn default_destination(&self) -> Option<Rc<str>> {
        if let Some(cached) = self.cached_default() {
            return Some(cached);
        }

        if let Some(name) = self.env_default() {
            debug!(dest = %name, "default destination from environment");
            return Some(self.cache_default(&name));
        }

        let request = default_destination_request(&self.user(), self.next_request_id());
        let outcome = self
            .send(&request, "/")
            .and_then(|response| decode_default_destination(&response));

        match self.record(outcome) {
            Ok(Some(name)) => {
                debug!(dest = %name, "default destination from server");
                Some(self.cache_default(&name))
            }
            Ok(None) => {
                self.set_last_error(
                    StatusCode::NOT_FOUND,
                    Some("no default destination".to_string()),
                );
                debug!("server has no default destination");
                None
            }
            Err(e) => {
                warn!(error = %e, "default destination lookup failed");
                None
            }
        }
    }
}

/// Default destination of the calling thread's session.
pub fn resolve_default_destination() -> Option<String> {
    match acquire_context() {
        Ok(session) => session.default_destination().map(|name| name.to_string()),
        Err(e) => {
            warn!(error = %e, "no session for default destination lookup");
            None
        }
    }
}
