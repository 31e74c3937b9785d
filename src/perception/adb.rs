//! Transport over the Android Debug Bridge, plus LDPlayer console helpers.

use crate::error::TransportError;
use crate::perception::Transport;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Output};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Drives targets through `adb -s <serial> ...`.
///
/// Targets are addressed by name; a name without an explicit serial is used as the serial.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    adb: PathBuf,
    serials: HashMap<String, String>,
}

impl AdbTransport {
    pub fn new(adb: impl Into<PathBuf>) -> Self {
        AdbTransport {
            adb: adb.into(),
            serials: HashMap::new(),
        }
    }

    pub fn with_serial(mut self, target: impl Into<String>, serial: impl Into<String>) -> Self {
        self.serials.insert(target.into(), serial.into());
        self
    }

    pub fn with_serials(mut self, serials: HashMap<String, String>) -> Self {
        self.serials.extend(serials);
        self
    }

    pub fn serial<'a>(&'a self, target: &'a str) -> &'a str {
        self.serials.get(target).map_or(target, String::as_str)
    }

    /// Serials of the devices currently attached (`adb devices`).
    pub fn devices(&self) -> Result<Vec<String>, TransportError> {
        let output = run(&self.adb, &["devices"])?;
        Ok(parse_adb_devices(&String::from_utf8_lossy(&output.stdout)))
    }

    fn run_on(&self, target: &str, args: &[&str]) -> Result<Output, TransportError> {
        let mut full = vec!["-s", self.serial(target)];
        full.extend_from_slice(args);
        run(&self.adb, &full)
    }
}

impl Transport for AdbTransport {
    fn capture(&self, target: &str) -> Result<Vec<u8>, TransportError> {
        let output = self.run_on(target, &["exec-out", "screencap", "-p"])?;
        Ok(restore_line_endings(output.stdout))
    }

    fn tap(&self, target: &str, x: u32, y: u32) -> Result<(), TransportError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run_on(target, &["shell", "input", "tap", &x, &y])?;
        Ok(())
    }

    fn is_reachable(&self, target: &str) -> bool {
        match self.run_on(target, &["get-state"]) {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim() == "device",
            Err(e) => {
                log::debug!("[{}] get-state failed: {}", target, e);
                false
            }
        }
    }
}

fn run(program: &std::path::Path, args: &[&str]) -> Result<Output, TransportError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| TransportError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(TransportError::Status {
            command: format!("{} {}", program.display(), args.join(" ")),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Undoes the `\n` -> `\r\r\n` translation some Windows adb hosts apply to binary output.
/// Data with an intact PNG signature is returned unchanged.
pub fn restore_line_endings(bytes: Vec<u8>) -> Vec<u8> {
    if bytes.starts_with(PNG_SIGNATURE) {
        return bytes;
    }
    let mut restored = Vec::with_capacity(bytes.len());
    let mut rest = bytes.as_slice();
    while !rest.is_empty() {
        if rest.starts_with(b"\r\r\n") {
            restored.push(b'\n');
            rest = &rest[3..];
        } else {
            restored.push(rest[0]);
            rest = &rest[1..];
        }
    }
    restored
}

/// Parses `adb devices` output into serials of devices in the `device` state.
pub fn parse_adb_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            (fields.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}

/// One emulator instance as reported by `ldconsole list2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorInfo {
    pub index: u32,
    pub name: String,
    pub running: bool,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

/// Parses `ldconsole list2` output.
///
/// Each line is `index,title,top_hwnd,bind_hwnd,android_started,pid,vbox_pid,width,height,dpi`.
/// Malformed lines are skipped.
pub fn parse_console_list(output: &str) -> Vec<EmulatorInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_console_line(line);
            if parsed.is_none() {
                log::debug!("skipping console line `{}`", line.trim());
            }
            parsed
        })
        .collect()
}

fn parse_console_line(line: &str) -> Option<EmulatorInfo> {
    let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if parts.len() < 10 {
        return None;
    }
    Some(EmulatorInfo {
        index: parts[0].parse().ok()?,
        name: parts[1].to_string(),
        running: parts[4] == "1",
        width: parts[7].parse().ok()?,
        height: parts[8].parse().ok()?,
        dpi: parts[9].parse().ok()?,
    })
}

/// Pairs running emulators, in console order, with attached adb serials.
pub fn bind_serials(emulators: &[EmulatorInfo], serials: &[String]) -> HashMap<String, String> {
    emulators
        .iter()
        .filter(|e| e.running)
        .zip(serials)
        .map(|(e, serial)| (e.name.clone(), serial.clone()))
        .collect()
}

/// The LDPlayer management console.
#[derive(Debug, Clone)]
pub struct LdConsole {
    path: PathBuf,
}

impl LdConsole {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LdConsole { path: path.into() }
    }

    pub fn list(&self) -> Result<Vec<EmulatorInfo>, TransportError> {
        let output = run(&self.path, &["list2"])?;
        Ok(parse_console_list(&String::from_utf8_lossy(&output.stdout)))
    }
}
