use std::path::PathBuf;

use crate::app::models::CommandInvocation;

/// Logical adb operations the session can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListDevices,
    Connect { address: String },
    Install { apk_path: PathBuf, replace: bool },
    InstallMultiple { apk_paths: Vec<PathBuf>, replace: bool },
    Uninstall { package: String },
}

impl Operation {
    /// `devices` enumerates across all devices and `connect` precedes having a
    /// target, so neither is ever device-scoped.
    fn takes_device_scope(&self) -> bool {
        !matches!(self, Operation::ListDevices | Operation::Connect { .. })
    }
}

/// Pure argv construction: no I/O, no side effects. Scoped operations get a
/// `-s <serial>` prefix when a device is selected.
pub fn build(operation: &Operation, selected: Option<&str>) -> CommandInvocation {
    let mut argv = Vec::new();
    let bound_device = match selected {
        Some(serial) if operation.takes_device_scope() => {
            argv.push("-s".to_string());
            argv.push(serial.to_string());
            Some(serial.to_string())
        }
        _ => None,
    };

    match operation {
        Operation::ListDevices => argv.push("devices".to_string()),
        Operation::Connect { address } => {
            argv.push("connect".to_string());
            argv.push(address.clone());
        }
        Operation::Install { apk_path, replace } => {
            argv.push("install".to_string());
            if *replace {
                argv.push("-r".to_string());
            }
            argv.push(apk_path.to_string_lossy().to_string());
        }
        Operation::InstallMultiple { apk_paths, replace } => {
            argv.push("install-multiple".to_string());
            if *replace {
                argv.push("-r".to_string());
            }
            argv.extend(
                apk_paths
                    .iter()
                    .map(|path| path.to_string_lossy().to_string()),
            );
        }
        Operation::Uninstall { package } => {
            argv.push("uninstall".to_string());
            argv.push(package.clone());
        }
    }

    CommandInvocation { argv, bound_device }
}
