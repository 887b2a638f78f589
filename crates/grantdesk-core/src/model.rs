use serde::{Deserialize, Serialize};

pub const NO_PERMISSIONS_ASSIGNED: &str = "No permissions assigned";

/// A registered application as returned by the directory service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Stable external identifier; used as the preferred-selection hint.
    pub app_id: String,
    /// Internal identifier that keys permission queries.
    pub object_id: String,
    pub display_name: String,
}

impl Application {
    pub fn new(
        app_id: impl Into<String>,
        object_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            object_id: object_id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub enabled: bool,
}

impl Permission {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    permissions: Vec<Permission>,
}

impl PermissionSet {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self { permissions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn enabled_names(&self) -> impl Iterator<Item = &str> {
        self.permissions
            .iter()
            .filter(|permission| permission.enabled)
            .map(|permission| permission.name.as_str())
    }

    /// Names from `names` that match no permission of the set.
    pub fn unknown_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|name| name.as_ref().trim())
            .filter(|name| !self.permissions.iter().any(|permission| permission.name == *name))
            .map(str::to_string)
            .collect()
    }

    /// Returns a copy where exactly the named permissions are enabled.
    /// Names not present in the set are ignored.
    pub fn with_enabled<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let permissions = self
            .permissions
            .iter()
            .map(|permission| Permission {
                name: permission.name.clone(),
                enabled: names
                    .iter()
                    .any(|name| name.as_ref().trim() == permission.name),
            })
            .collect();
        Self { permissions }
    }

    /// Comma-joined names of the enabled permissions, or
    /// [`NO_PERMISSIONS_ASSIGNED`] when none are enabled.
    pub fn summary(&self) -> String {
        let joined = self.enabled_names().collect::<Vec<_>>().join(", ");
        if joined.trim().is_empty() {
            NO_PERMISSIONS_ASSIGNED.to_string()
        } else {
            joined
        }
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePermissionEntry {
    pub service: Service,
    pub permissions: PermissionSet,
}

impl ServicePermissionEntry {
    pub fn new(service: Service, permissions: PermissionSet) -> Self {
        Self {
            service,
            permissions,
        }
    }

    pub fn summary(&self) -> String {
        self.permissions.summary()
    }
}
