//! Mapping TMDB responses onto [`SyncError`].
//!
//! Pure functions over `(http status, body)` so every branch is testable
//! without a network.

use serde::de::DeserializeOwned;

use super::types::StatusBody;
use crate::error::SyncError;

/// TMDB status codes that mean the credential, not the request, is at fault.
///
/// 3: authentication failed, 7: invalid API key, 14: authentication failed,
/// 30: invalid credentials, 33: invalid request token.
const AUTH_STATUS_CODES: &[i64] = &[3, 7, 14, 30, 33];

/// "Internal error", which TMDB returns for list deletes that did succeed.
const LIST_DELETE_QUIRK_CODE: i64 = 11;

/// Classify the HTTP layer only: auth failures and non-2xx statuses.
pub fn classify_status(status: u16, body: &str) -> Result<(), SyncError> {
    let parsed: Option<StatusBody> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|b| b.status_code);
    let message = parsed
        .as_ref()
        .and_then(|b| b.status_message.clone())
        .unwrap_or_else(|| format!("HTTP {status}"));

    if status == 401 || code.is_some_and(|c| AUTH_STATUS_CODES.contains(&c)) {
        return Err(SyncError::AuthRejected(message));
    }
    if !(200..300).contains(&status) {
        return Err(SyncError::rejected(Some(status), message));
    }
    Ok(())
}

/// Classify a mutation response (`{success, status_code, status_message}`).
pub fn classify_mutation(status: u16, body: &str) -> Result<(), SyncError> {
    classify_status(status, body)?;
    let parsed: StatusBody = parse_body(body)?;
    if parsed.success == Some(false) {
        return Err(SyncError::rejected(
            Some(status),
            parsed
                .status_message
                .unwrap_or_else(|| "request was not applied".into()),
        ));
    }
    Ok(())
}

/// Like [`classify_mutation`], but accepts TMDB's 500/code 11 answer to a
/// list delete as success.
pub fn classify_list_delete(status: u16, body: &str) -> Result<(), SyncError> {
    if status == 500 {
        if let Ok(parsed) = serde_json::from_str::<StatusBody>(body) {
            if parsed.status_code == Some(LIST_DELETE_QUIRK_CODE) {
                return Ok(());
            }
        }
    }
    classify_mutation(status, body)
}

/// Classify, then decode a data payload.
pub fn parse_payload<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, SyncError> {
    classify_status(status, body)?;
    parse_body(body)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "Unparseable TMDB response");
        SyncError::MalformedResponse(e.to_string())
    })
}
