use std::{fs, io, path::PathBuf};

use grantdesk_core::Session;
use grantdesk_util::{remove_file_if_exists, state_file_path, write_json_atomic};
use tracing::{debug, warn};

const SESSION_FILE: &str = "session.json";

/// Cached session token, so consecutive commands do not prompt again.
#[derive(Clone, Debug)]
pub(crate) struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn default_location() -> Self {
        Self::new(state_file_path(SESSION_FILE))
    }

    /// Returns the cached session if it is still valid.
    pub(crate) fn load(&self) -> Option<Session> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", self.path.display());
                }
                return None;
            }
        };
        match serde_json::from_str::<Session>(&data) {
            Ok(session) if session.is_valid() => Some(session),
            Ok(_) => {
                debug!("cached session expired");
                None
            }
            Err(err) => {
                warn!("Failed to parse {}: {err}", self.path.display());
                None
            }
        }
    }

    pub(crate) fn save(&self, session: &Session) -> io::Result<()> {
        write_json_atomic(&self.path, session)
    }

    pub(crate) fn clear(&self) -> io::Result<()> {
        remove_file_if_exists(&self.path)
    }
}
