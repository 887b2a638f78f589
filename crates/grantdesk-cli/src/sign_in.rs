use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use grantdesk_core::{InteractiveSignIn, Session, SignInError, SignInOutcome};
use tracing::warn;

use crate::session_store::SessionStore;

const SESSION_LIFETIME_MS: i64 = 60 * 60 * 1000;

/// Asks for consent on the terminal and issues a local session.
pub(crate) struct StdinSignIn {
    assume_yes: bool,
    account: String,
    store: SessionStore,
}

impl StdinSignIn {
    pub(crate) fn new(assume_yes: bool, store: SessionStore) -> Self {
        Self {
            assume_yes,
            account: grantdesk_util::env_or("USER", "local"),
            store,
        }
    }
}

#[async_trait]
impl InteractiveSignIn for StdinSignIn {
    async fn prompt(&self) -> Result<SignInOutcome, SignInError> {
        let accepted = if self.assume_yes {
            true
        } else {
            let account = self.account.clone();
            tokio::task::spawn_blocking(move || ask(&account))
                .await
                .map_err(|err| SignInError(err.to_string()))?
                .map_err(|err| SignInError(err.to_string()))?
        };
        if !accepted {
            return Ok(SignInOutcome::Declined);
        }

        let session = Session::issue(self.account.clone(), Some(SESSION_LIFETIME_MS));
        if let Err(err) = self.store.save(&session) {
            warn!("Failed to cache session: {err}");
        }
        Ok(SignInOutcome::Authenticated(session))
    }
}

fn ask(account: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(stderr, "Sign in as {account}? [y/N] ")?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no answer on stdin",
        ));
    }
    Ok(parse_answer(&line))
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
