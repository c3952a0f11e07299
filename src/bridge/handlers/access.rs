//! Caller identification for API keys and browser sessions.
//!
//! API callers send `Authorization: token <key>`. Browser callers carry the
//! session cookie set by the login flow.

use poem::Request;
use tracing::{debug, warn};

use crate::bridge::error::BridgeError;
use crate::bridge::storage::Store;

/// Cookie holding the browser session id
pub const SESSION_COOKIE: &str = "fleet-session";

const TOKEN_PREFIX: &str = "token ";

/// Who is calling an endpoint that accepts both kinds of caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Api,
    Browser { user: String },
}

/// API key from the `Authorization` header, if one was sent.
pub(crate) fn api_key(req: &Request) -> Option<&str> {
    let header = req.header("authorization")?.trim();
    let key = header.strip_prefix(TOKEN_PREFIX).unwrap_or(header).trim();
    (!key.is_empty()).then_some(key)
}

/// Require a valid API key.
///
/// # Errors
///
/// [`BridgeError::Unauthorized`] when the key is missing or rejected.
pub(crate) fn require_api_key(
    req: &Request,
    store: &dyn Store,
    admin_only: bool,
) -> Result<(), BridgeError> {
    let key = api_key(req).ok_or(BridgeError::Unauthorized)?;
    if store.validate_api_key(key, admin_only)? {
        Ok(())
    } else {
        warn!("Rejected api key (admin={})", admin_only);
        Err(BridgeError::Unauthorized)
    }
}

/// Logged-in user of the browser session, if any.
pub(crate) fn session_user(req: &Request, store: &dyn Store) -> Result<Option<String>, BridgeError> {
    let Some(cookie) = req.cookie().get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let session_id = cookie.value_str();
    if session_id.is_empty() {
        return Ok(None);
    }

    let now = chrono::Utc::now().timestamp();
    Ok(store
        .get_user_session(session_id)?
        .filter(|session| session.is_logged_in(now))
        .map(|session| session.user))
}

/// Accept an admin API key or a logged-in browser session.
///
/// An API key that validates wins. Otherwise a valid session makes the
/// caller a browser. With neither, the answer is 401 if a key was sent and
/// 403 if nothing was.
pub(crate) fn admin_or_session(req: &Request, store: &dyn Store) -> Result<Caller, BridgeError> {
    let key = api_key(req);
    if let Some(key) = key
        && store.validate_api_key(key, true)?
    {
        return Ok(Caller::Api);
    }

    if let Some(user) = session_user(req, store)? {
        debug!("Browser session of {}", user);
        return Ok(Caller::Browser { user });
    }

    if key.is_some() {
        warn!("Rejected admin api key");
        Err(BridgeError::Unauthorized)
    } else {
        Err(BridgeError::Forbidden)
    }
}

/// Require a logged-in browser session.
pub(crate) fn require_session(req: &Request, store: &dyn Store) -> Result<String, BridgeError> {
    session_user(req, store)?.ok_or(BridgeError::Forbidden)
}
