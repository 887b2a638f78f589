//! File-backed directory and permissions service for local use.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::model::{Application, ServicePermissionEntry};
use crate::services::{DirectoryService, PermissionsService};
use crate::session::Session;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    applications: Vec<CatalogApplication>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CatalogApplication {
    #[serde(flatten)]
    app: Application,
    #[serde(default)]
    services: Vec<ServicePermissionEntry>,
}

/// Applications and their service grants stored in one JSON document.
///
/// A missing file is an empty directory. Writes go through
/// [`grantdesk_util::write_json_atomic`] and are serialized by an internal
/// lock so concurrent registrations never lose each other.
pub struct JsonCatalog {
    path: PathBuf,
    latency: Duration,
    write_lock: Mutex<()>,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latency: Duration::ZERO,
            write_lock: Mutex::new(()),
        }
    }

    /// Delays every call, to make load transitions observable.
    pub fn with_latency(self, latency: Duration) -> Self {
        Self { latency, ..self }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the permission set of one service of an application.
    pub async fn store_permissions(
        &self,
        session: &Session,
        object_id: &str,
        entry: &ServicePermissionEntry,
    ) -> Result<(), ServiceError> {
        authorize(session)?;
        let _guard = self.write_lock.lock().await;
        let mut file = self.read().await?;

        let app = file
            .applications
            .iter_mut()
            .find(|candidate| candidate.app.object_id == object_id)
            .ok_or_else(|| not_found(format!("application {object_id}")))?;
        let service = app
            .services
            .iter_mut()
            .find(|candidate| candidate.service.id == entry.service.id)
            .ok_or_else(|| not_found(format!("service {}", entry.service.id)))?;
        service.permissions = entry.permissions.clone();

        self.write(&file)?;
        info!(object_id, service = %entry.service.id, "permissions stored");
        Ok(())
    }

    async fn read(&self) -> Result<CatalogFile, ServiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("catalog {} not found; treating as empty", self.path.display());
                Ok(CatalogFile::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, file: &CatalogFile) -> Result<(), ServiceError> {
        grantdesk_util::write_json_atomic(&self.path, file)?;
        Ok(())
    }
}

fn authorize(session: &Session) -> Result<(), ServiceError> {
    if session.is_valid() {
        Ok(())
    } else {
        Err(ServiceError::Rejected {
            status: 401,
            message: "session is not valid".into(),
        })
    }
}

fn not_found(what: String) -> ServiceError {
    ServiceError::Rejected {
        status: 404,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl DirectoryService for JsonCatalog {
    async fn list_applications(&self, session: &Session) -> Result<Vec<Application>, ServiceError> {
        authorize(session)?;
        let file = self.read().await?;
        Ok(file.applications.into_iter().map(|entry| entry.app).collect())
    }

    async fn register_application(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Application, ServiceError> {
        authorize(session)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ServiceError::Rejected {
                status: 400,
                message: "display name is required".into(),
            });
        }

        let _guard = self.write_lock.lock().await;
        let mut file = self.read().await?;
        let app = Application::new(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            display_name,
        );
        file.applications.push(CatalogApplication {
            app: app.clone(),
            services: Vec::new(),
        });
        self.write(&file)?;

        info!(app_id = %app.app_id, "application registered");
        Ok(app)
    }
}

#[async_trait]
impl PermissionsService for JsonCatalog {
    async fn list_permissions(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<Vec<ServicePermissionEntry>, ServiceError> {
        authorize(session)?;
        let file = self.read().await?;
        file.applications
            .into_iter()
            .find(|entry| entry.app.object_id == object_id)
            .map(|entry| entry.services)
            .ok_or_else(|| not_found(format!("application {object_id}")))
    }
}
