use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use grantdesk_core::{
    AuthGate, AuthOutcome, ConfigController, DirectoryService, ErrorReporter, JsonCatalog,
    PermissionSet, Pipeline, ServicePermissionEntry, TracingErrorReporter, WorkflowStatus,
};
use tracing::info;

mod config;
mod render;
mod session_store;
mod sign_in;

use config::AppConfig;
use session_store::SessionStore;
use sign_in::StdinSignIn;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "grantdesk", version, about = "Inspect and edit application permission grants")]
struct Cli {
    /// Answer yes at the sign-in prompt
    #[arg(long, global = true)]
    yes: bool,
    /// Catalog file (overrides GRANTDESK_CATALOG and the config file)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List applications and the permissions of the selected one
    Apps {
        /// App id to select instead of the last used one
        #[arg(long)]
        prefer: Option<String>,
    },
    /// Show the permission table of one application
    Permissions {
        #[arg(long)]
        app: String,
    },
    /// Replace the enabled permissions of one service row
    Grant {
        #[arg(long)]
        app: String,
        #[arg(long)]
        row: usize,
        /// Permission names to enable; all others are disabled
        #[arg(long, value_delimiter = ',')]
        enable: Vec<String>,
    },
    /// Register a new application and select it
    Register {
        #[arg(long)]
        name: String,
    },
    /// Drop the cached session and sign in again
    SignOut,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    grantdesk_util::init_tracing()?;
    grantdesk_util::init_app_telemetry("grantdesk", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    let catalog_path = cli.catalog.clone().unwrap_or_else(|| config.catalog_path());
    info!("using catalog {}", catalog_path.display());
    let catalog = Arc::new(
        JsonCatalog::new(catalog_path).with_latency(Duration::from_millis(config.latency_ms)),
    );

    let store = SessionStore::default_location();
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingErrorReporter);
    let mut auth = AuthGate::new(
        Arc::new(StdinSignIn::new(cli.yes, store.clone())),
        reporter.clone(),
    );
    if let Some(session) = store.load() {
        auth = auth.with_session(session);
    }
    let auth = Arc::new(auth);

    let pipeline = Pipeline::new(auth.clone(), catalog.clone(), catalog.clone(), reporter);
    let mut controller = ConfigController::start(pipeline, config.dispatcher_options())?;

    match cli.cmd {
        Cmd::Apps { prefer } => {
            load(&mut controller, prefer.or_else(|| config.preferred_app_id())).await?;
            print!("{}", render::format_picker(&controller.picker()));
            println!();
            print!("{}", render::format_table(&controller.table()));
        }
        Cmd::Permissions { app } => {
            load(&mut controller, Some(app.clone())).await?;
            require_selected(&controller, &app)?;
            print!("{}", render::format_table(&controller.table()));
        }
        Cmd::Grant { app, row, enable } => {
            load(&mut controller, Some(app.clone())).await?;
            let object_id = require_selected(&controller, &app)?;

            let loaded = controller.current_permissions_state();
            let entries = loaded.ready().map(Vec::as_slice).unwrap_or_default();
            let permissions = edited_permissions(entries, row, &enable)?;
            let updated = controller.submit_permission_edit(row, permissions)?;

            let session = auth
                .current_session()
                .await
                .ok_or("session ended before the edit could be stored")?;
            catalog
                .store_permissions(&session, &object_id, &updated)
                .await?;
            println!("{}\t{}", updated.service.name, updated.summary());
        }
        Cmd::Register { name } => {
            let session = match auth.ensure_authenticated().await {
                AuthOutcome::Ready(session) => session,
                AuthOutcome::Aborted => return Err("sign-in cancelled".into()),
            };
            let app = catalog.register_application(&session, &name).await?;
            println!("registered {} ({})", app.display_name, app.app_id);

            load(&mut controller, Some(app.app_id)).await?;
            print!("{}", render::format_picker(&controller.picker()));
        }
        Cmd::SignOut => {
            store.clear()?;
            controller.sign_out_and_reload();
            settle(&mut controller).await?;
            print!("{}", render::format_picker(&controller.picker()));
        }
    }

    if let Some(app) = controller.selected_application() {
        if config.last_app_id != app.app_id {
            config.last_app_id = app.app_id.clone();
            config.save_best_effort();
        }
    }
    Ok(())
}

async fn load(controller: &mut ConfigController, preferred_app_id: Option<String>) -> CliResult<()> {
    controller.request_apps_reload(preferred_app_id);
    settle(controller).await
}

async fn settle(controller: &mut ConfigController) -> CliResult<()> {
    match controller.run_until_settled().await {
        WorkflowStatus::Active => Ok(()),
        WorkflowStatus::Cancelled => Err("sign-in cancelled".into()),
    }
}

/// Object id of the selected application, which must be `app_id`.
fn require_selected(controller: &ConfigController, app_id: &str) -> CliResult<String> {
    match controller.selected_application() {
        Some(app) if app.app_id == app_id => Ok(app.object_id.clone()),
        _ => Err(format!("application {app_id} not found").into()),
    }
}

/// The permission set of `row` with exactly `enable` turned on. Names that
/// the row does not offer are rejected rather than silently dropped.
fn edited_permissions(
    entries: &[ServicePermissionEntry],
    row: usize,
    enable: &[String],
) -> CliResult<PermissionSet> {
    let entry = entries
        .get(row)
        .ok_or_else(|| format!("row {row} not found; {} rows loaded", entries.len()))?;
    let unknown = entry.permissions.unknown_names(enable);
    if !unknown.is_empty() {
        return Err(format!(
            "{} has no permission named {}",
            entry.service.name,
            unknown.join(", ")
        )
        .into());
    }
    Ok(entry.permissions.with_enabled(enable))
}

#[cfg(test)]
mod tests {
    use grantdesk_core::{Permission, Service};

    use super::*;

    fn mail_row() -> ServicePermissionEntry {
        ServicePermissionEntry::new(
            Service::new("mail", "Mail"),
            PermissionSet::new(vec![
                Permission::new("Mail.Read", true),
                Permission::new("Mail.Send", false),
            ]),
        )
    }

    #[test]
    fn grant_enables_exactly_the_named_permissions() {
        let permissions =
            edited_permissions(&[mail_row()], 0, &["Mail.Send".to_string()]).expect("edit");
        assert_eq!(permissions.summary(), "Mail.Send");
    }

    #[test]
    fn grant_rejects_misspelled_permission_names() {
        let err = edited_permissions(&[mail_row()], 0, &["Mail.Sned".to_string()])
            .expect_err("unknown name");
        assert!(err.to_string().contains("Mail.Sned"));
    }

    #[test]
    fn grant_rejects_rows_that_are_not_loaded() {
        let err = edited_permissions(&[mail_row()], 2, &[]).expect_err("row 2 missing");
        assert!(err.to_string().contains("row 2 not found"));
    }
}
