use tracing::debug;

use crate::app::models::{Device, DeviceState, StreamKind};

pub const DEVICES_HEADER: &str = "List of devices attached";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Terminal result of one process run: whatever trailing unterminated output
/// remained, plus the device snapshot if a listing header was seen.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseOutcome {
    pub log_lines: Vec<LogLine>,
    pub devices: Option<Vec<Device>>,
}

/// Incremental parser over raw stdout/stderr chunks. A chunk boundary may
/// split a line, so partial lines are buffered per stream until a terminator
/// arrives. Once the device-listing header is seen, subsequent well-formed
/// lines accumulate into a snapshot instead of passing through as log lines;
/// the snapshot is handed out by `finish` when the process completes.
#[derive(Debug, Default)]
pub struct OutputParser {
    stdout_buf: String,
    stderr_buf: String,
    in_listing: bool,
    devices: Vec<Device>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk; returns the displayable log lines it completed.
    pub fn push_chunk(&mut self, stream: StreamKind, chunk: &str) -> Vec<LogLine> {
        let mut lines = Vec::new();
        match stream {
            StreamKind::Stdout => self.stdout_buf.push_str(chunk),
            StreamKind::Stderr => self.stderr_buf.push_str(chunk),
        }

        loop {
            let line = {
                let buffer = match stream {
                    StreamKind::Stdout => &mut self.stdout_buf,
                    StreamKind::Stderr => &mut self.stderr_buf,
                };
                match buffer.find('\n') {
                    Some(newline) => buffer.drain(..=newline).collect::<String>(),
                    None => break,
                }
            };
            if let Some(log) = Self::handle_line(
                &mut self.in_listing,
                &mut self.devices,
                stream,
                line.trim_end_matches(['\r', '\n']),
            ) {
                lines.push(log);
            }
        }
        lines
    }

    /// Flushes any unterminated trailing line on both streams and yields the
    /// accumulated device snapshot. `Some` only if a header was seen; an empty
    /// snapshot (header with no device lines) is still a valid full refresh.
    pub fn finish(mut self) -> ParseOutcome {
        let mut lines = Vec::new();
        for (stream, leftover) in [
            (StreamKind::Stdout, std::mem::take(&mut self.stdout_buf)),
            (StreamKind::Stderr, std::mem::take(&mut self.stderr_buf)),
        ] {
            if leftover.is_empty() {
                continue;
            }
            if let Some(log) = Self::handle_line(
                &mut self.in_listing,
                &mut self.devices,
                stream,
                leftover.trim_end_matches(['\r', '\n']),
            ) {
                lines.push(log);
            }
        }

        let devices = if self.in_listing {
            Some(self.devices)
        } else {
            None
        };
        ParseOutcome {
            log_lines: lines,
            devices,
        }
    }

    fn handle_line(
        in_listing: &mut bool,
        devices: &mut Vec<Device>,
        stream: StreamKind,
        line: &str,
    ) -> Option<LogLine> {
        if line.contains(DEVICES_HEADER) {
            *in_listing = true;
            devices.clear();
            return None;
        }

        if *in_listing {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('*') {
                // Blank separators and adb daemon chatter.
                return None;
            }
            match parse_device_line(trimmed) {
                Some(device) => devices.push(device),
                None => debug!(line = %trimmed, "skipping malformed device listing line"),
            }
            return None;
        }

        if line.trim().is_empty() {
            return None;
        }
        Some(LogLine {
            stream,
            text: line.to_string(),
        })
    }
}

/// `<serial> <state> [extra tokens...]`; fewer than two tokens is malformed
/// and skipped by the caller rather than failing the whole listing.
pub fn parse_device_line(line: &str) -> Option<Device> {
    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?;
    let state = tokens.next()?;
    Some(Device {
        serial: serial.to_string(),
        state: DeviceState::from_token(state),
    })
}
