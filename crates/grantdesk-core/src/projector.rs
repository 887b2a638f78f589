//! Pure mapping from scope state to renderable rows and labels.

use crate::edit::PermissionEditBroker;
use crate::state::{ApplicationList, LoadState, Scope};

pub const LOADING_PICKER: &str = "(loading...)";
pub const LOADING_ROW: &str = "(loading... )";
pub const NO_APPS_PICKER: &str = "No apps configured";
pub const NO_APPS_ROW: &str = "There are no applications configured.";
pub const NO_PERMISSIONS_ROW: &str = "There are no application permissions.";
pub const NO_SELECTION_ROW: &str = "(no application selected)";
pub const APPS_FETCH_FAILED: &str =
    "An error occurred while attempting to fetch the list of applications.";
pub const PERMISSIONS_FETCH_FAILED: &str =
    "An error occurred while attempting to fetch permissions for the application's services.";
pub const AUTH_FAILED: &str = "An error occurred while attempting to authenticate.";

/// Width range of the service column, in presentation units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnBounds {
    pub min: u32,
    pub preferred: u32,
    pub max: u32,
}

impl ColumnBounds {
    pub fn clamp(&self, width: u32) -> u32 {
        width.clamp(self.min, self.max)
    }
}

pub const SERVICE_COLUMN: ColumnBounds = ColumnBounds {
    min: 100,
    preferred: 185,
    max: 250,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projection<R> {
    /// Single-row message in place of data.
    Placeholder(String),
    Rows(R),
    Error { message: String, detail: String },
}

impl<R> Projection<R> {
    pub fn rows(&self) -> Option<&R> {
        match self {
            Projection::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Projection::Placeholder(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRow {
    pub row: usize,
    pub service: String,
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionTable {
    pub service_column: ColumnBounds,
    pub rows: Vec<PermissionRow>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationPicker {
    pub enabled: bool,
    pub entries: Vec<String>,
    pub selected: Option<usize>,
}

/// Projects any scope state; `rows` is only called for `Ready`.
pub fn project<T, R>(
    scope: Scope,
    state: &LoadState<T>,
    rows: impl FnOnce(&T) -> R,
) -> Projection<R> {
    match (scope, state) {
        (Scope::Permissions, LoadState::Idle) => Projection::Placeholder(NO_SELECTION_ROW.into()),
        (_, LoadState::Idle) | (_, LoadState::Loading) => {
            Projection::Placeholder(LOADING_ROW.into())
        }
        (Scope::Applications, LoadState::Empty) => Projection::Placeholder(NO_APPS_ROW.into()),
        (Scope::Permissions, LoadState::Empty) => {
            Projection::Placeholder(NO_PERMISSIONS_ROW.into())
        }
        (Scope::Applications, LoadState::Error(err)) => Projection::Error {
            message: APPS_FETCH_FAILED.into(),
            detail: err.to_string(),
        },
        (Scope::Permissions, LoadState::Error(err)) => Projection::Error {
            message: PERMISSIONS_FETCH_FAILED.into(),
            detail: err.to_string(),
        },
        (_, LoadState::Ready(value)) => Projection::Rows(rows(value)),
    }
}

pub fn permission_table(broker: &PermissionEditBroker) -> PermissionTable {
    PermissionTable {
        service_column: SERVICE_COLUMN,
        rows: broker
            .entries()
            .iter()
            .enumerate()
            .map(|(row, entry)| PermissionRow {
                row,
                service: entry.service.name.clone(),
                summary: entry.summary(),
            })
            .collect(),
    }
}

/// The permission grid: shows the applications scope until it is Ready,
/// then the permissions scope.
pub fn project_table(
    apps: &LoadState<ApplicationList>,
    permissions: &LoadState<PermissionEditBroker>,
) -> Projection<PermissionTable> {
    if apps.is_ready() {
        project(Scope::Permissions, permissions, permission_table)
    } else {
        match project(Scope::Applications, apps, |_| ()) {
            Projection::Placeholder(text) => Projection::Placeholder(text),
            Projection::Error { message, detail } => Projection::Error { message, detail },
            Projection::Rows(()) => Projection::Placeholder(LOADING_ROW.into()),
        }
    }
}

pub fn project_picker(
    apps: &LoadState<ApplicationList>,
    selected: Option<usize>,
) -> ApplicationPicker {
    match apps {
        LoadState::Ready(list) => ApplicationPicker {
            enabled: true,
            entries: list
                .items()
                .iter()
                .map(|app| app.display_name.clone())
                .collect(),
            selected: selected.filter(|index| *index < list.len()),
        },
        other => {
            let label = match other {
                LoadState::Empty => NO_APPS_PICKER,
                LoadState::Error(_) => APPS_FETCH_FAILED,
                _ => LOADING_PICKER,
            };
            ApplicationPicker {
                enabled: false,
                entries: vec![label.to_string()],
                selected: Some(0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{app, entry};

    fn ready_apps() -> LoadState<ApplicationList> {
        LoadState::Ready(
            ApplicationList::resolve(vec![app("x"), app("y")], Some("y")).expect("non-empty"),
        )
    }

    #[test]
    fn empty_apps_disable_picker_and_explain_in_table() {
        let apps = LoadState::Empty;
        let picker = project_picker(&apps, None);

        assert!(!picker.enabled);
        assert_eq!(picker.entries, vec![NO_APPS_PICKER.to_string()]);
        assert_eq!(
            project_table(&apps, &LoadState::Idle).placeholder(),
            Some(NO_APPS_ROW)
        );
    }

    #[test]
    fn loading_apps_mask_the_permissions_scope() {
        let permissions = LoadState::Ready(PermissionEditBroker::new(app("x"), Vec::new()));
        let table = project_table(&LoadState::Loading, &permissions);
        assert_eq!(table.placeholder(), Some(LOADING_ROW));
        assert!(!project_picker(&LoadState::Loading, None).enabled);
    }

    #[test]
    fn error_states_render_a_message_not_data() {
        let cause = ServiceError::Unavailable("gateway timeout".into());
        let table = project_table(&ready_apps(), &LoadState::Error(cause));

        match table {
            Projection::Error { message, detail } => {
                assert_eq!(message, PERMISSIONS_FETCH_FAILED);
                assert!(detail.contains("gateway timeout"), "got: {detail}");
            }
            other => panic!("expected error projection, got {other:?}"),
        }
    }

    #[test]
    fn ready_permissions_become_rows_with_summaries() {
        let broker = PermissionEditBroker::new(
            app("y"),
            vec![
                entry("Mail", &[("A", true), ("B", false), ("C", true)]),
                entry("Files", &[("Read", false)]),
            ],
        );
        let table = project_table(&ready_apps(), &LoadState::Ready(broker));
        let rows = table.rows().expect("rows");

        assert_eq!(rows.service_column, SERVICE_COLUMN);
        assert_eq!(rows.rows[0].service, "Mail");
        assert_eq!(rows.rows[0].summary, "A, C");
        assert_eq!(rows.rows[1].summary, "No permissions assigned");
    }

    #[test]
    fn empty_permissions_have_their_own_message() {
        assert_eq!(
            project_table(&ready_apps(), &LoadState::Empty).placeholder(),
            Some(NO_PERMISSIONS_ROW)
        );
    }

    #[test]
    fn picker_lists_display_names_with_selection() {
        let picker = project_picker(&ready_apps(), Some(1));
        assert!(picker.enabled);
        assert_eq!(picker.entries, vec!["App x".to_string(), "App y".to_string()]);
        assert_eq!(picker.selected, Some(1));
        assert_eq!(project_picker(&ready_apps(), Some(9)).selected, None);
    }

    #[test]
    fn service_column_bounds_clamp() {
        assert_eq!(SERVICE_COLUMN.clamp(20), 100);
        assert_eq!(SERVICE_COLUMN.clamp(185), 185);
        assert_eq!(SERVICE_COLUMN.clamp(900), 250);
    }
}
