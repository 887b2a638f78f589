//! Opt-in usage and crash telemetry, written as local files.
//!
//! Usage events are appended to `<root>/<app>/events.jsonl` by a background
//! thread fed through a bounded channel; recording an event never blocks.
//! Crash reports are written synchronously from the panic hook.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

const QUEUE_CAPACITY: usize = 256;
const ROTATE_AT_BYTES: u64 = 2 * 1024 * 1024;
const MAX_VALUE_CHARS: usize = 512;

const USAGE_ENV: &str = "GRANTDESK_TELEMETRY";
const CRASH_ENV: &str = "GRANTDESK_TELEMETRY_CRASH";
const INSTALL_ID_ENV: &str = "GRANTDESK_TELEMETRY_INSTALL_ID";

#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    /// Directory under which per-app telemetry folders are created.
    pub root: PathBuf,
    pub usage_enabled: bool,
    pub crash_enabled: bool,
    pub install_id: Option<String>,
}

impl TelemetryOptions {
    /// Options with both streams controlled by `GRANTDESK_TELEMETRY*`.
    pub fn from_env(app_name: &'static str, app_version: &'static str, root: PathBuf) -> Self {
        Self {
            app_name,
            app_version,
            root,
            usage_enabled: flag_enabled(USAGE_ENV),
            crash_enabled: flag_enabled(CRASH_ENV),
            install_id: std::env::var(INSTALL_ID_ENV)
                .ok()
                .filter(|id| !id.trim().is_empty()),
        }
    }
}

#[derive(Serialize)]
struct UsageEvent {
    event: String,
    at_unix_millis: i64,
    app: &'static str,
    version: &'static str,
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    install_id: Option<String>,
    props: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct CrashReport<'a> {
    at_unix_millis: i64,
    app: &'static str,
    version: &'static str,
    run_id: &'a str,
    message: String,
    location: Option<String>,
    backtrace: String,
}

/// Files of one application's telemetry folder.
#[derive(Clone, Debug)]
struct Sink {
    dir: PathBuf,
}

impl Sink {
    fn new(root: &Path, app_name: &str) -> Self {
        Self {
            dir: root.join("telemetry").join(app_name),
        }
    }

    fn events_path(&self) -> PathBuf {
        self.dir.join("events.jsonl")
    }

    fn append(&self, event: &UsageEvent) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.events_path();
        if fs::metadata(&path).is_ok_and(|meta| meta.len() >= ROTATE_AT_BYTES) {
            fs::rename(&path, path.with_extension("jsonl.1"))?;
        }
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")
    }

    fn write_crash(&self, report: &CrashReport<'_>) -> io::Result<PathBuf> {
        let dir = self.dir.join("crashes");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "crash-{}-{}.json",
            report.at_unix_millis,
            std::process::id()
        ));
        let data = serde_json::to_vec_pretty(report).map_err(io::Error::other)?;
        fs::write(&path, data)?;
        Ok(path)
    }
}

pub struct Telemetry {
    app_name: &'static str,
    app_version: &'static str,
    run_id: String,
    install_id: Option<String>,
    usage_enabled: AtomicBool,
    crash_enabled: AtomicBool,
    sink: Sink,
    queue: SyncSender<UsageEvent>,
}

static TELEMETRY: OnceLock<Arc<Telemetry>> = OnceLock::new();

/// Installs process-wide telemetry. Later calls only update the enabled
/// flags of the existing instance.
pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(existing) = TELEMETRY.get() {
        existing.set_enabled(options.usage_enabled, options.crash_enabled);
        return Arc::clone(existing);
    }

    let (telemetry, queue) = Telemetry::new(options);
    let telemetry = Arc::new(telemetry);
    spawn_writer(telemetry.sink.clone(), queue);
    install_panic_hook(Arc::clone(&telemetry));

    let _ = TELEMETRY.set(Arc::clone(&telemetry));
    telemetry
}

/// Records a usage event. A no-op until [`init`] has run or while usage
/// telemetry is disabled.
pub fn event(name: &str, props: &[(&str, &str)]) {
    if let Some(telemetry) = TELEMETRY.get() {
        telemetry.record(name, props);
    }
}

pub fn is_usage_enabled() -> bool {
    TELEMETRY
        .get()
        .is_some_and(|telemetry| telemetry.usage_enabled.load(Ordering::Relaxed))
}

impl Telemetry {
    fn new(options: TelemetryOptions) -> (Self, Receiver<UsageEvent>) {
        let (queue, receiver) = sync_channel(QUEUE_CAPACITY);
        let telemetry = Self {
            app_name: options.app_name,
            app_version: options.app_version,
            run_id: run_id(),
            install_id: options.install_id,
            usage_enabled: AtomicBool::new(options.usage_enabled),
            crash_enabled: AtomicBool::new(options.crash_enabled),
            sink: Sink::new(&options.root, options.app_name),
            queue,
        };
        (telemetry, receiver)
    }

    fn set_enabled(&self, usage: bool, crash: bool) {
        self.usage_enabled.store(usage, Ordering::Relaxed);
        self.crash_enabled.store(crash, Ordering::Relaxed);
    }

    fn record(&self, name: &str, props: &[(&str, &str)]) {
        if !self.usage_enabled.load(Ordering::Relaxed) {
            return;
        }
        // Dropped when the writer falls behind.
        let _ = self.queue.try_send(self.usage_event(name, props));
    }

    fn usage_event(&self, name: &str, props: &[(&str, &str)]) -> UsageEvent {
        UsageEvent {
            event: name.to_string(),
            at_unix_millis: now_millis(),
            app: self.app_name,
            version: self.app_version,
            run_id: self.run_id.clone(),
            install_id: self.install_id.clone(),
            props: sanitize_props(props),
        }
    }

    fn report_crash(&self, message: String, location: Option<String>) {
        if !self.crash_enabled.load(Ordering::Relaxed) {
            return;
        }
        let report = CrashReport {
            at_unix_millis: now_millis(),
            app: self.app_name,
            version: self.app_version,
            run_id: &self.run_id,
            message,
            location,
            backtrace: std::backtrace::Backtrace::capture().to_string(),
        };
        if let Err(err) = self.sink.write_crash(&report) {
            eprintln!("telemetry: failed to write crash report: {err}");
        }
    }
}

fn sanitize_props(props: &[(&str, &str)]) -> BTreeMap<String, String> {
    props
        .iter()
        .map(|(key, value)| (key.trim(), value))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| {
            (
                key.to_string(),
                value.chars().take(MAX_VALUE_CHARS).collect(),
            )
        })
        .collect()
}

fn spawn_writer(sink: Sink, receiver: Receiver<UsageEvent>) {
    let spawned = std::thread::Builder::new()
        .name("grantdesk-telemetry".into())
        .spawn(move || {
            for event in receiver {
                if let Err(err) = sink.append(&event) {
                    eprintln!(
                        "telemetry: failed to append to {}: {err}",
                        sink.events_path().display()
                    );
                }
            }
        });
    if let Err(err) = spawned {
        eprintln!("telemetry: writer thread not started: {err}");
    }
}

fn install_panic_hook(telemetry: Arc<Telemetry>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        telemetry.report_crash(message, location);
        previous(info);
    }));
}

fn flag_enabled(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn run_id() -> String {
    format!("{:x}-{:x}", now_millis(), std::process::id())
}
