use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};

use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::adb::bundle::{extract_bundle, is_apk, is_bundle, normalize_package_path};
use crate::app::adb::command::{self, Operation};
use crate::app::adb::locator::resolve_adb_program;
use crate::app::adb::parse::{LogLine, OutputParser};
use crate::app::adb::runner::{spawn_streaming, ProcessEvent, ProcessHandle};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::{LogStyle, SessionEvent, SessionRequest, StreamKind};
use crate::app::registry::DeviceRegistry;
use crate::app::workspace::TempWorkspace;

/// Everything the orchestrator loop reacts to, multiplexed onto one channel:
/// presentation requests and the in-flight process's output/exit events.
#[derive(Debug)]
pub enum SessionMsg {
    Request(SessionRequest),
    Process(ProcessEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

struct InFlight {
    handle: ProcessHandle,
    parser: OutputParser,
    trace_id: String,
}

/// Single-threaded orchestrator: owns the device registry, the single-slot
/// in-flight process guard, and the at-most-one live bundle workspace. All
/// mutation happens on the loop thread that feeds `handle_msg`, so no
/// internal locking is needed.
pub struct Session {
    program: String,
    replace_existing: bool,
    registry: DeviceRegistry,
    workspace: Option<TempWorkspace>,
    in_flight: Option<InFlight>,
    self_tx: Sender<SessionMsg>,
    events: Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        program: String,
        replace_existing: bool,
        self_tx: Sender<SessionMsg>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            program,
            replace_existing,
            registry: DeviceRegistry::new(),
            workspace: None,
            in_flight: None,
            self_tx,
            events,
        }
    }

    pub fn handle_msg(&mut self, msg: SessionMsg) -> Flow {
        match msg {
            SessionMsg::Request(request) => self.handle_request(request),
            SessionMsg::Process(event) => {
                self.handle_process_event(event);
                Flow::Continue
            }
        }
    }

    fn handle_request(&mut self, request: SessionRequest) -> Flow {
        let trace_id = Uuid::new_v4().to_string();

        match request {
            SessionRequest::Shutdown => {
                self.shutdown();
                return Flow::Shutdown;
            }
            // Single-slot guard: one process at a time, overlapping requests
            // are rejected rather than queued.
            _ if self.in_flight.is_some() => {
                self.emit_error(AppError::busy(&trace_id));
            }
            SessionRequest::RefreshDevices => {
                self.start_operation(Operation::ListDevices, &trace_id);
            }
            SessionRequest::Connect { address } => {
                let address = address.trim().to_string();
                if !looks_like_connect_address(&address) {
                    self.emit_error(AppError::validation(
                        format!("Invalid connect address: {address:?} (expected HOST:PORT)"),
                        &trace_id,
                    ));
                    return Flow::Continue;
                }
                self.start_operation(
                    Operation::Connect {
                        address: with_default_port(address),
                    },
                    &trace_id,
                );
            }
            SessionRequest::SelectDevice { serial } => match self.registry.select(&serial, &trace_id) {
                Ok(()) => {
                    info!(trace_id = %trace_id, serial = %serial, "device selected");
                    self.emit_log(LogStyle::Command, format!("Selected device: {serial}"));
                    self.emit(SessionEvent::SelectionChanged {
                        serial: Some(serial),
                    });
                }
                Err(err) => self.emit_error(err),
            },
            SessionRequest::Install { path } => self.handle_install(path, &trace_id),
            SessionRequest::Uninstall { package } => {
                let package = package.trim().to_string();
                if package.is_empty() {
                    self.emit_error(AppError::validation("Package id is required", &trace_id));
                    return Flow::Continue;
                }
                self.start_operation(Operation::Uninstall { package }, &trace_id);
            }
        }
        Flow::Continue
    }

    fn handle_install(&mut self, path: PathBuf, trace_id: &str) {
        let path = normalize_package_path(&path.to_string_lossy());
        if !path.is_file() {
            self.emit_error(AppError::validation(
                format!("Package file not found: {}", path.display()),
                trace_id,
            ));
            return;
        }

        if is_apk(&path) {
            self.start_operation(
                Operation::Install {
                    apk_path: path,
                    replace: self.replace_existing,
                },
                trace_id,
            );
        } else if is_bundle(&path) {
            self.handle_bundle_install(&path, trace_id);
        } else {
            self.emit_error(AppError::validation(
                format!("Unsupported package type: {}", path.display()),
                trace_id,
            ));
        }
    }

    fn handle_bundle_install(&mut self, archive: &Path, trace_id: &str) {
        // A new extraction supersedes any previous workspace. We are Idle
        // here (the in-flight guard already passed), so nothing references
        // the old directory and releasing it is safe. Release happens before
        // the new extraction regardless of how that extraction turns out.
        if let Some(previous) = self.workspace.take() {
            previous.release(trace_id);
        }

        self.emit_log(LogStyle::Command, "Extracting bundle...".to_string());
        let workspace = match TempWorkspace::create(trace_id) {
            Ok(workspace) => workspace,
            Err(err) => {
                self.emit_error(err);
                return;
            }
        };
        // Track the workspace before extracting so that even a failed
        // extraction is reclaimed on supersession or shutdown.
        let dest = workspace.root().to_path_buf();
        self.workspace = Some(workspace);

        let plan = match extract_bundle(archive, &dest, trace_id) {
            Ok(plan) => plan,
            Err(err) => {
                // Short-circuit: no process is launched. On ERR_BUNDLE_EMPTY
                // the extracted tree stays on disk for inspection.
                self.emit_error(err);
                return;
            }
        };

        self.emit_log(LogStyle::Command, "install-multiple:".to_string());
        for apk in &plan.apk_paths {
            self.emit_log(LogStyle::Plain, format!("  {}", apk.display()));
        }
        self.emit_log(LogStyle::Command, "Installing bundle...".to_string());

        self.start_operation(
            Operation::InstallMultiple {
                apk_paths: plan.apk_paths,
                replace: self.replace_existing,
            },
            trace_id,
        );
    }

    fn start_operation(&mut self, operation: Operation, trace_id: &str) {
        let invocation = command::build(&operation, self.registry.selected_serial());
        self.emit_log(LogStyle::Command, invocation.display());

        let tx = self.self_tx.clone();
        match spawn_streaming(&self.program, &invocation.argv, trace_id, move |event| {
            let _ = tx.send(SessionMsg::Process(event));
        }) {
            Ok(handle) => {
                debug!(trace_id = %trace_id, argv = ?invocation.argv, "process started");
                self.in_flight = Some(InFlight {
                    handle,
                    parser: OutputParser::new(),
                    trace_id: trace_id.to_string(),
                });
            }
            Err(err) => {
                // Fatal to this operation only; the session stays Idle and
                // accepts the next request.
                self.emit_error(err);
            }
        }
    }

    fn handle_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output { stream, chunk } => {
                let Some(in_flight) = self.in_flight.as_mut() else {
                    // Late chunk from a killed process; nothing to attribute
                    // it to any more.
                    return;
                };
                let lines = in_flight.parser.push_chunk(stream, &chunk);
                self.emit_log_lines(lines);
            }
            ProcessEvent::Exited { exit_code } => {
                let Some(in_flight) = self.in_flight.take() else {
                    return;
                };
                let outcome = in_flight.parser.finish();
                self.emit_log_lines(outcome.log_lines);

                if let Some(devices) = outcome.devices {
                    let selection_lost = self.registry.replace_all(devices);
                    self.emit(SessionEvent::DeviceList {
                        devices: self.registry.devices().to_vec(),
                    });
                    if selection_lost {
                        self.emit(SessionEvent::SelectionChanged { serial: None });
                    }
                }

                if exit_code != Some(0) {
                    // Heterogeneous adb exit semantics: report, do not raise.
                    self.emit_log(
                        LogStyle::Error,
                        match exit_code {
                            Some(code) => format!("Process exited with code {code}"),
                            None => "Process terminated by signal".to_string(),
                        },
                    );
                }
                info!(
                    trace_id = %in_flight.trace_id,
                    exit_code = ?exit_code,
                    "operation finished"
                );
                self.emit(SessionEvent::OperationFinished { exit_code });
            }
        }
    }

    /// Kills any in-flight process, then reclaims the workspace. The kill
    /// precedes the delete: removing an install source out from under a
    /// running install would be a correctness hazard.
    fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            warn!(trace_id = %in_flight.trace_id, "killing in-flight process on shutdown");
            in_flight.handle.kill();
        }
        if let Some(workspace) = self.workspace.take() {
            workspace.release("shutdown");
        }
        info!("session shut down");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_log(&self, style: LogStyle, text: String) {
        self.emit(SessionEvent::Log { style, text });
    }

    fn emit_log_lines(&self, lines: Vec<LogLine>) {
        for line in lines {
            let style = match line.stream {
                StreamKind::Stdout => LogStyle::Plain,
                StreamKind::Stderr => LogStyle::Error,
            };
            self.emit_log(style, line.text);
        }
    }

    fn emit_error(&self, error: AppError) {
        warn!(code = %error.code, trace_id = %error.trace_id, "{}", error.error);
        self.emit(SessionEvent::Error { error });
    }
}

/// `HOST[:PORT]`; adb itself defaults a missing port to 5555, so a bare host
/// is accepted here and the default is made explicit by the caller.
fn looks_like_connect_address(address: &str) -> bool {
    static CONNECT_RE: OnceLock<Option<Regex>> = OnceLock::new();
    CONNECT_RE
        .get_or_init(|| Regex::new(r"^[^\s:]+(:\d{1,5})?$").ok())
        .as_ref()
        .map(|re| re.is_match(address))
        .unwrap_or(true)
}

const DEFAULT_CONNECT_PORT: u16 = 5555;

fn with_default_port(address: String) -> String {
    if address.contains(':') {
        address
    } else {
        format!("{address}:{DEFAULT_CONNECT_PORT}")
    }
}

/// Owning handle for a session running on its own loop thread. Requests go
/// in through `request`; log lines, device snapshots and selection changes
/// come back through `events`.
pub struct SessionHandle {
    tx: Sender<SessionMsg>,
    events: Receiver<SessionEvent>,
    join: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn spawn(config: &AppConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let program = resolve_adb_program(&config.adb.command_path);
        let replace_existing = config.adb.replace_existing;
        let loop_tx = tx.clone();

        let join = thread::spawn(move || {
            let mut session = Session::new(program, replace_existing, loop_tx, event_tx);
            while let Ok(msg) = rx.recv() {
                if session.handle_msg(msg) == Flow::Shutdown {
                    return;
                }
            }
            // Every request sender dropped without an explicit shutdown;
            // clean up as if one had arrived.
            session.shutdown();
        });

        Self {
            tx,
            events: event_rx,
            join: Some(join),
        }
    }

    pub fn request(&self, request: SessionRequest) {
        let _ = self.tx.send(SessionMsg::Request(request));
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // The loop holds its own self_tx clone, so the request channel never
        // disconnects on its own; an explicit Shutdown is what ends the loop.
        let _ = self.tx.send(SessionMsg::Request(SessionRequest::Shutdown));
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error;
    use crate::app::models::{Device, DeviceState};
    use std::fs::{self, File};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    struct Harness {
        session: Session,
        msgs: Receiver<SessionMsg>,
        events: Receiver<SessionEvent>,
    }

    impl Harness {
        fn new(program: &str) -> Self {
            let (tx, msgs) = mpsc::channel();
            let (event_tx, events) = mpsc::channel();
            Self {
                session: Session::new(program.to_string(), true, tx, event_tx),
                msgs,
                events,
            }
        }

        fn request(&mut self, request: SessionRequest) -> Flow {
            self.session.handle_msg(SessionMsg::Request(request))
        }

        /// Pumps process messages, as the loop thread would, until the
        /// in-flight slot empties.
        fn drive_to_idle(&mut self) {
            while self.session.in_flight.is_some() {
                let msg = self
                    .msgs
                    .recv_timeout(Duration::from_secs(10))
                    .expect("process event");
                self.session.handle_msg(msg);
            }
        }

        fn drain_events(&self) -> Vec<SessionEvent> {
            self.events.try_iter().collect()
        }
    }

    #[cfg(unix)]
    fn fake_adb(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake_adb");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path.to_string_lossy().to_string()
    }

    fn write_bundle(path: &Path, entries: &[&str]) {
        let file = File::create(path).expect("bundle file");
        let mut zip = zip::ZipWriter::new(file);
        for name in entries {
            zip.start_file(*name, FileOptions::<()>::default())
                .expect("entry");
            zip.write_all(b"payload").expect("body");
        }
        zip.finish().expect("finish");
    }

    fn seed_devices(session: &mut Session, serials: &[&str]) {
        session.registry.replace_all(
            serials
                .iter()
                .map(|serial| Device {
                    serial: serial.to_string(),
                    state: DeviceState::Device,
                })
                .collect(),
        );
    }

    #[test]
    #[cfg(unix)]
    fn refresh_replaces_registry_from_listing() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(
            tmp.path(),
            "echo 'List of devices attached'; echo 'XYZ123 device'; echo 'ABC456 offline'",
        );
        let mut harness = Harness::new(&program);

        harness.request(SessionRequest::RefreshDevices);
        harness.drive_to_idle();

        assert_eq!(harness.session.registry.devices().len(), 2);
        assert_eq!(
            harness.session.registry.get("ABC456").map(|d| d.state),
            Some(DeviceState::Offline)
        );

        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::DeviceList { devices } if devices.len() == 2
        )));
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::OperationFinished { exit_code: Some(0) })));
    }

    #[test]
    #[cfg(unix)]
    fn refresh_clears_selection_when_device_disappears() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(
            tmp.path(),
            "echo 'List of devices attached'; echo 'OTHER device'",
        );
        let mut harness = Harness::new(&program);
        seed_devices(&mut harness.session, &["GONE"]);
        harness.request(SessionRequest::SelectDevice {
            serial: "GONE".to_string(),
        });

        harness.request(SessionRequest::RefreshDevices);
        harness.drive_to_idle();

        assert_eq!(harness.session.registry.selected_serial(), None);
        let events = harness.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::SelectionChanged { serial: None })));
    }

    #[test]
    fn select_unknown_serial_reports_not_found() {
        let mut harness = Harness::new("adb");
        harness.request(SessionRequest::SelectDevice {
            serial: "NOPE".to_string(),
        });

        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_DEVICE_NOT_FOUND
        )));
        assert!(harness.session.in_flight.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn overlapping_request_is_rejected_with_busy() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "sleep 2");
        let mut harness = Harness::new(&program);

        harness.request(SessionRequest::RefreshDevices);
        assert!(harness.session.in_flight.is_some());
        harness.request(SessionRequest::Uninstall {
            package: "com.example".to_string(),
        });

        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_BUSY
        )));

        harness.drive_to_idle();
        assert!(harness.session.in_flight.is_none());
    }

    #[test]
    fn launch_failure_is_synchronous_and_leaves_session_idle() {
        let mut harness = Harness::new("/no/such/adb-binary");
        harness.request(SessionRequest::RefreshDevices);

        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_LAUNCH
        )));
        assert!(harness.session.in_flight.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_surfaces_as_log_not_error() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "echo 'adb: failed' >&2; exit 5");
        let mut harness = Harness::new(&program);

        harness.request(SessionRequest::Uninstall {
            package: "com.example.app".to_string(),
        });
        harness.drive_to_idle();

        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::OperationFinished { exit_code: Some(5) }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Log { style: LogStyle::Error, text } if text.contains("code 5")
        )));
        // Not an application error: ready for the next request.
        assert!(!events
            .iter()
            .any(|event| matches!(event, SessionEvent::Error { .. })));
        assert!(harness.session.in_flight.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn apk_install_is_scoped_to_the_selected_device() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "exit 0");
        let apk = tmp.path().join("app.apk");
        fs::write(&apk, b"apk").expect("apk");

        let mut harness = Harness::new(&program);
        seed_devices(&mut harness.session, &["XYZ123"]);
        harness.request(SessionRequest::SelectDevice {
            serial: "XYZ123".to_string(),
        });
        harness.request(SessionRequest::Install { path: apk.clone() });
        harness.drive_to_idle();

        let events = harness.drain_events();
        let expected = format!("$ adb -s XYZ123 install -r {}", apk.display());
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Log { style: LogStyle::Command, text } if *text == expected
        )));
    }

    #[test]
    #[cfg(unix)]
    fn connect_is_never_scoped_and_validates_address() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "echo connected");
        let mut harness = Harness::new(&program);
        seed_devices(&mut harness.session, &["XYZ123"]);
        harness.request(SessionRequest::SelectDevice {
            serial: "XYZ123".to_string(),
        });

        harness.request(SessionRequest::Connect {
            address: "10.0.0.1:notaport".to_string(),
        });
        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_VALIDATION
        )));

        harness.request(SessionRequest::Connect {
            address: "192.168.0.5:5555".to_string(),
        });
        harness.drive_to_idle();
        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Log { style: LogStyle::Command, text }
                if text.as_str() == "$ adb connect 192.168.0.5:5555"
        )));
    }

    #[test]
    #[cfg(unix)]
    fn bare_connect_host_gets_the_default_port() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "echo connected");
        let mut harness = Harness::new(&program);

        harness.request(SessionRequest::Connect {
            address: "192.168.0.9".to_string(),
        });
        harness.drive_to_idle();
        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Log { style: LogStyle::Command, text }
                if text.as_str() == "$ adb connect 192.168.0.9:5555"
        )));
    }

    #[test]
    fn connect_address_shapes() {
        assert!(looks_like_connect_address("192.168.0.5:5555"));
        assert!(looks_like_connect_address("192.168.0.5"));
        assert!(looks_like_connect_address("my-device.local:40123"));
        assert!(!looks_like_connect_address("10.0.0.1:notaport"));
        assert!(!looks_like_connect_address("two words"));
        assert!(!looks_like_connect_address(":5555"));
        assert!(!looks_like_connect_address(""));

        assert_eq!(
            with_default_port("192.168.0.9".to_string()),
            "192.168.0.9:5555"
        );
        assert_eq!(
            with_default_port("192.168.0.9:4444".to_string()),
            "192.168.0.9:4444"
        );
    }

    #[test]
    fn dropping_the_handle_stops_the_loop_thread() {
        let handle = SessionHandle::spawn(&AppConfig::default());
        // Drop joins the loop thread; this test hangs instead of passing if
        // the loop leaks.
        drop(handle);
    }

    #[test]
    #[cfg(unix)]
    fn bundle_install_extracts_sorted_plan_and_supersedes_prior_workspace() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "exit 0");
        let first = tmp.path().join("first.xapk");
        write_bundle(&first, &["b/x.apk", "a/y.apk", "a.apk"]);
        let second = tmp.path().join("second.apkm");
        write_bundle(&second, &["base.apk"]);

        let mut harness = Harness::new(&program);
        harness.request(SessionRequest::Install {
            path: first.clone(),
        });
        let first_root = harness
            .session
            .workspace
            .as_ref()
            .expect("workspace")
            .root()
            .to_path_buf();
        harness.drive_to_idle();

        let events = harness.drain_events();
        let echo = events
            .iter()
            .find_map(|event| match event {
                SessionEvent::Log {
                    style: LogStyle::Command,
                    text,
                } if text.starts_with("$ adb install-multiple") => Some(text.clone()),
                _ => None,
            })
            .expect("install-multiple echo");
        let a = echo.find("a.apk").expect("a.apk in argv");
        let ay = echo.find("a/y.apk").expect("a/y.apk in argv");
        let bx = echo.find("b/x.apk").expect("b/x.apk in argv");
        assert!(a < ay && ay < bx, "plan must be in sorted order: {echo}");
        assert!(first_root.is_dir());

        harness.request(SessionRequest::Install { path: second });
        harness.drive_to_idle();
        assert!(
            !first_root.exists(),
            "prior workspace must be released when superseded"
        );
        let second_root = harness
            .session
            .workspace
            .as_ref()
            .expect("workspace")
            .root()
            .to_path_buf();
        assert!(second_root.is_dir());
    }

    #[test]
    #[cfg(unix)]
    fn empty_bundle_short_circuits_and_keeps_workspace_until_shutdown() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "exit 0");
        let bundle = tmp.path().join("empty.xapk");
        write_bundle(&bundle, &["manifest.json"]);

        let mut harness = Harness::new(&program);
        harness.request(SessionRequest::Install { path: bundle });

        // No process was launched.
        assert!(harness.session.in_flight.is_none());
        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_BUNDLE_EMPTY
        )));

        // Workspace left in place for inspection, reclaimed on shutdown.
        let root = harness
            .session
            .workspace
            .as_ref()
            .expect("workspace tracked")
            .root()
            .to_path_buf();
        assert!(root.is_dir());
        assert_eq!(harness.request(SessionRequest::Shutdown), Flow::Shutdown);
        assert!(!root.exists());
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_kills_in_flight_install_before_releasing_workspace() {
        let tmp = TempDir::new().expect("tmp");
        let program = fake_adb(tmp.path(), "sleep 30");
        let bundle = tmp.path().join("slow.xapk");
        write_bundle(&bundle, &["base.apk"]);

        let mut harness = Harness::new(&program);
        harness.request(SessionRequest::Install { path: bundle });
        assert!(harness.session.in_flight.is_some());
        let root = harness
            .session
            .workspace
            .as_ref()
            .expect("workspace")
            .root()
            .to_path_buf();
        assert!(root.is_dir());

        assert_eq!(harness.request(SessionRequest::Shutdown), Flow::Shutdown);

        // The install source was only deleted once the process was gone.
        assert!(!root.exists());
        assert!(harness.session.in_flight.is_none());

        // The killed child reports its terminal exit promptly instead of
        // sleeping out the full 30 seconds; signal death carries no code.
        let exited = loop {
            match harness.msgs.recv_timeout(Duration::from_secs(5)) {
                Ok(SessionMsg::Process(ProcessEvent::Exited { exit_code })) => break exit_code,
                Ok(_) => continue,
                Err(err) => panic!("no exit event after kill: {err}"),
            }
        };
        assert_eq!(exited, None);
    }

    #[test]
    fn install_of_missing_file_is_a_validation_error() {
        let mut harness = Harness::new("adb");
        harness.request(SessionRequest::Install {
            path: PathBuf::from("/no/such/app.apk"),
        });
        let events = harness.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error } if error.code == error::ERR_VALIDATION
        )));
    }
}
