use std::fmt;

use crate::error::ServiceError;
use crate::model::Application;

/// One of the two independently loaded targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Applications,
    Permissions,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Applications => "applications",
            Scope::Permissions => "permissions",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a scope. `Idle` is only observed before the first request for a
/// scope (the permissions scope before any application is selected).
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LoadState<T> {
    #[default]
    Idle,
    Loading,
    Empty,
    Error(ServiceError),
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, LoadState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }

    /// True once a load has reached a terminal state (or none was requested).
    pub fn is_settled(&self) -> bool {
        !self.is_loading()
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ServiceError> {
        match self {
            LoadState::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadState<U> {
        match self {
            LoadState::Idle => LoadState::Idle,
            LoadState::Loading => LoadState::Loading,
            LoadState::Empty => LoadState::Empty,
            LoadState::Error(err) => LoadState::Error(err),
            LoadState::Ready(value) => LoadState::Ready(f(value)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Empty => "empty",
            LoadState::Error(_) => "error",
            LoadState::Ready(_) => "ready",
        }
    }
}

/// Non-empty ordered application list with its resolved default selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationList {
    items: Vec<Application>,
    default_index: usize,
}

impl ApplicationList {
    /// Returns `None` for an empty list; the caller reports that as Empty.
    pub fn resolve(items: Vec<Application>, preferred_app_id: Option<&str>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let default_index = preferred_app_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| items.iter().position(|app| app.app_id == id))
            .unwrap_or(0);
        Some(Self {
            items,
            default_index,
        })
    }

    pub fn items(&self) -> &[Application] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Application> {
        self.items.get(index)
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn position_of_object_id(&self, object_id: &str) -> Option<usize> {
        self.items.iter().position(|app| app.object_id == object_id)
    }
}
