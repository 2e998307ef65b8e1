//! Bearer-token suppliers for account-scoped calls.

use std::fmt;

/// Environment variable holding the account access token.
pub const ACCESS_TOKEN_VAR: &str = "MARQUEE_ACCESS_TOKEN";
/// Environment variable holding the numeric account ID.
pub const ACCOUNT_ID_VAR: &str = "MARQUEE_ACCOUNT_ID";

/// A user access token and the account it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub account_id: u64,
}

impl Credential {
    pub fn new(token: impl Into<String>, account_id: u64) -> Self {
        Self {
            token: token.into(),
            account_id,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Supplies the current credential, if any.
///
/// Clients ask on every call so a provider may rotate tokens underneath them.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<Credential>;
}

/// A fixed credential (or the fixed absence of one).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<Credential>);

impl StaticCredentials {
    pub fn new(credential: Credential) -> Self {
        Self(Some(credential))
    }

    pub fn none() -> Self {
        Self(None)
    }

    /// From optional config values; both must be present.
    pub fn from_parts(token: Option<String>, account_id: Option<u64>) -> Self {
        Self(build(token, account_id))
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self) -> Option<Credential> {
        self.0.clone()
    }
}

/// Reads the credential from the environment on each call, falling back to
/// configured values.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    fallback_token: Option<String>,
    fallback_account: Option<u64>,
}

impl EnvCredentials {
    pub fn new(fallback_token: Option<String>, fallback_account: Option<u64>) -> Self {
        Self {
            fallback_token,
            fallback_account,
        }
    }

    fn resolve(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<Credential> {
        let token = lookup(ACCESS_TOKEN_VAR).or_else(|| self.fallback_token.clone());
        let account = lookup(ACCOUNT_ID_VAR)
            .and_then(|raw| raw.trim().parse().ok())
            .or(self.fallback_account);
        build(token, account)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credential(&self) -> Option<Credential> {
        self.resolve(|key| std::env::var(key).ok())
    }
}

fn build(token: Option<String>, account_id: Option<u64>) -> Option<Credential> {
    let token = token.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())?;
    Some(Credential::new(token, account_id?))
}
