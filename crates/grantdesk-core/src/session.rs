use serde::{Deserialize, Serialize};

/// Authenticated credential handle required before any remote call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account: String,
    pub token: String,
    pub issued_at_unix_millis: i64,
    #[serde(default)]
    pub expires_at_unix_millis: Option<i64>,
}

impl Session {
    /// Issues a fresh session with a random token.
    pub fn issue(account: impl Into<String>, lifetime_millis: Option<i64>) -> Self {
        let issued_at_unix_millis = grantdesk_util::now_millis();
        Self {
            account: account.into(),
            token: uuid::Uuid::new_v4().to_string(),
            issued_at_unix_millis,
            expires_at_unix_millis: lifetime_millis.map(|ms| issued_at_unix_millis + ms),
        }
    }

    pub fn is_valid_at(&self, now_unix_millis: i64) -> bool {
        if self.token.trim().is_empty() {
            return false;
        }
        match self.expires_at_unix_millis {
            Some(expires_at) => now_unix_millis < expires_at,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(grantdesk_util::now_millis())
    }
}
