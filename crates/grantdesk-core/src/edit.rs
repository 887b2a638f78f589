use tracing::debug;

use crate::error::PipelineError;
use crate::model::{Application, PermissionSet, ServicePermissionEntry};

/// Owns the canonical permission rows of the selected application and
/// applies in-place edits to them. Only the permission set of a row is
/// editable; the service column never changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionEditBroker {
    app: Application,
    entries: Vec<ServicePermissionEntry>,
    revision: u64,
}

impl PermissionEditBroker {
    pub fn new(app: Application, entries: Vec<ServicePermissionEntry>) -> Self {
        Self {
            app,
            entries,
            revision: 0,
        }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn entries(&self) -> &[ServicePermissionEntry] {
        &self.entries
    }

    pub fn get(&self, row: usize) -> Option<&ServicePermissionEntry> {
        self.entries.get(row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of edits that actually changed a row.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply_edit(
        &mut self,
        row: usize,
        permissions: PermissionSet,
    ) -> Result<ServicePermissionEntry, PipelineError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(row)
            .ok_or(PipelineError::InvalidEditTarget { row, len })?;

        if entry.permissions != permissions {
            entry.permissions = permissions;
            self.revision += 1;
            debug!(
                row,
                service = %entry.service.id,
                revision = self.revision,
                "permission set updated"
            );
        }
        Ok(entry.clone())
    }
}
