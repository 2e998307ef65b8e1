use thiserror::Error;

/// Why a remote call failed.
///
/// None of these are retried automatically. `AuthRejected` means the
/// credential itself is bad, so the caller should ask for a new one instead
/// of repeating the action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("credential rejected: {0}")]
    AuthRejected(String),

    #[error("remote rejected the request ({}): {reason}", status_label(.status))]
    RemoteRejected { status: Option<u16>, reason: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }

    pub(crate) fn rejected(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            reason: reason.into(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "local".to_string(), |s| s.to_string())
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::rejected(Some(status.as_u16()), e.to_string())
        } else {
            // connect, timeout, request building, body streaming
            Self::NetworkUnavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = SyncError::rejected(Some(404), "not found");
        assert_eq!(e.to_string(), "remote rejected the request (404): not found");
        let e = SyncError::rejected(None, "rating out of range");
        assert_eq!(
            e.to_string(),
            "remote rejected the request (local): rating out of range"
        );
    }

    #[test]
    fn test_is_auth() {
        assert!(SyncError::AuthRejected("expired".into()).is_auth());
        assert!(!SyncError::NetworkUnavailable("offline".into()).is_auth());
    }
}
