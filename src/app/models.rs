use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::error::AppError;

/// Connection state as reported in an `adb devices` listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Unknown,
}

impl DeviceState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Device => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
}

/// Which pipe of the child process a chunk or line came from. Used for
/// presentation styling only, never for control decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStyle {
    Plain,
    Command,
    Error,
}

/// A fully built adb invocation. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandInvocation {
    pub argv: Vec<String>,
    pub bound_device: Option<String>,
}

impl CommandInvocation {
    pub fn display(&self) -> String {
        format!("$ adb {}", self.argv.join(" "))
    }
}

/// Ordered apk paths extracted from a bundle. Never empty: the extractor
/// fails with ERR_BUNDLE_EMPTY instead of producing an empty plan.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstallPlan {
    pub apk_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionRequest {
    RefreshDevices,
    Connect { address: String },
    SelectDevice { serial: String },
    Install { path: PathBuf },
    Uninstall { package: String },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Log {
        style: LogStyle,
        text: String,
    },
    DeviceList {
        devices: Vec<Device>,
    },
    SelectionChanged {
        serial: Option<String>,
    },
    OperationFinished {
        exit_code: Option<i32>,
    },
    Error {
        error: AppError,
    },
}
