use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;

use droidbridge::app::adb::locator::{resolve_adb_program, validate_adb_program};
use droidbridge::app::adb::runner::probe_adb_version;
use droidbridge::app::config::{load_config, save_config};
use droidbridge::app::logging::init_logging;
use droidbridge::app::models::{LogStyle, SessionEvent, SessionRequest};
use droidbridge::app::session::SessionHandle;
use tracing::warn;
use uuid::Uuid;

const HELP: &str = "commands:
  devices              refresh the device list
  connect <ip:port>    connect to a device over the network
  select <serial>      scope subsequent commands to one device
  install <path>       install an .apk, or an .xapk/.apkm/.apks bundle
  uninstall <package>  uninstall by package id
  set-adb <path>       persist the adb executable path (takes effect next launch)
  help                 show this help
  quit                 exit";

fn main() {
    let mut config = load_config().unwrap_or_else(|err| {
        eprintln!("warning: {err}; using default configuration");
        Default::default()
    });
    init_logging(&config.logging.log_level);

    let trace_id = Uuid::new_v4().to_string();
    let program = resolve_adb_program(&config.adb.command_path);
    if let Err(err) = validate_adb_program(&program) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    match probe_adb_version(&program, &trace_id) {
        Ok(version) => println!("{version}"),
        Err(err) => warn!(trace_id = %trace_id, "adb probe failed: {err}"),
    }

    let session = SessionHandle::spawn(&config);
    println!("{HELP}");

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let mut parts = line.trim().splitn(2, ' ');
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim().to_string();

        let request = match verb {
            "" => continue,
            "help" => {
                println!("{HELP}");
                continue;
            }
            "quit" | "exit" => break,
            "set-adb" => {
                let candidate = resolve_adb_program(&rest);
                if let Err(err) = validate_adb_program(&candidate) {
                    eprintln!("error: {err}");
                    continue;
                }
                config.adb.command_path = rest;
                match save_config(&config) {
                    Ok(()) => println!("saved; takes effect next launch"),
                    Err(err) => eprintln!("error: {err}"),
                }
                continue;
            }
            "devices" => SessionRequest::RefreshDevices,
            "connect" => SessionRequest::Connect { address: rest },
            "select" => SessionRequest::SelectDevice { serial: rest },
            "install" => SessionRequest::Install {
                path: PathBuf::from(rest),
            },
            "uninstall" => SessionRequest::Uninstall { package: rest },
            other => {
                println!("unknown command: {other} (try `help`)");
                continue;
            }
        };

        session.request(request);
        print_events_until_idle(&session);
    }

    session.shutdown();
}

/// Renders session events until the requested operation settles. Commands
/// that never start a process (select, rejected input) only produce a short
/// burst, so fall back to a quiet-period cutoff for those.
fn print_events_until_idle(session: &SessionHandle) {
    loop {
        match session.events().recv_timeout(Duration::from_millis(300)) {
            Ok(event) => {
                let done = matches!(event, SessionEvent::OperationFinished { .. });
                print_event(event);
                if done {
                    drain_pending(session);
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

fn drain_pending(session: &SessionHandle) {
    loop {
        match session.events().try_recv() {
            Ok(event) => print_event(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
        }
    }
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::Log { style, text } => match style {
            LogStyle::Plain => println!("{text}"),
            LogStyle::Command => println!("\x1b[90m{text}\x1b[0m"),
            LogStyle::Error => eprintln!("\x1b[91m{text}\x1b[0m"),
        },
        SessionEvent::DeviceList { devices } => {
            for device in devices {
                println!("{}  [{}]", device.serial, device.state.as_str());
            }
        }
        SessionEvent::SelectionChanged { serial } => match serial {
            Some(serial) => println!("selected: {serial}"),
            None => println!("selection cleared"),
        },
        SessionEvent::OperationFinished { exit_code } => {
            if exit_code != Some(0) {
                eprintln!("\x1b[91m(exit: {exit_code:?})\x1b[0m");
            }
        }
        SessionEvent::Error { error } => eprintln!("\x1b[91merror: {error}\x1b[0m"),
    }
}
