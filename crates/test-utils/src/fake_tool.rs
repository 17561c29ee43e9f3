//! Shell scripts that stand in for the device backup CLI.
//!
//! Scripts are invoked as `sh <script> <subcommand> [--full] <output_dir>`:
//! the output directory is always the last argument.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Describes what a fake backup tool does when run.
#[derive(Debug, Clone, Default)]
pub struct FakeTool {
    stdout: Vec<String>,
    stderr: Vec<String>,
    dirs: Vec<String>,
    files: Vec<(String, String)>,
    sleep_secs: Option<f32>,
    args_file: Option<PathBuf>,
    marker: Option<PathBuf>,
    exit_code: i32,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout_line(mut self, line: &str) -> Self {
        self.stdout.push(line.to_string());
        self
    }

    pub fn stderr_line(mut self, line: &str) -> Self {
        self.stderr.push(line.to_string());
        self
    }

    /// Create a directory (relative to the output dir).
    pub fn creates_dir(mut self, name: &str) -> Self {
        self.dirs.push(name.to_string());
        self
    }

    /// Create a file (relative to the output dir).
    pub fn creates_file(mut self, name: &str, contents: &str) -> Self {
        self.files.push((name.to_string(), contents.to_string()));
        self
    }

    /// Sleep after printing output, before creating anything.
    pub fn sleeps(mut self, secs: f32) -> Self {
        self.sleep_secs = Some(secs);
        self
    }

    /// Write every received argument, one per line, to `path`.
    pub fn records_args_to(mut self, path: &Path) -> Self {
        self.args_file = Some(path.to_path_buf());
        self
    }

    /// Touch `path` as the very first action, proving the tool was launched.
    pub fn touches_marker(mut self, path: &Path) -> Self {
        self.marker = Some(path.to_path_buf());
        self
    }

    pub fn exits_with(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn script(&self) -> String {
        let mut s = String::from("#!/bin/sh\n");
        if let Some(marker) = &self.marker {
            let _ = writeln!(s, "touch {}", quote(&marker.to_string_lossy()));
        }
        if let Some(args_file) = &self.args_file {
            let _ = writeln!(s, "printf '%s\\n' \"$@\" > {}", quote(&args_file.to_string_lossy()));
        }
        s.push_str("for out; do :; done\n");
        for line in &self.stdout {
            let _ = writeln!(s, "echo {}", quote(line));
        }
        for line in &self.stderr {
            let _ = writeln!(s, "echo {} >&2", quote(line));
        }
        if let Some(secs) = self.sleep_secs {
            let _ = writeln!(s, "sleep {secs}");
        }
        for dir in &self.dirs {
            let _ = writeln!(s, "mkdir -p \"$out\"/{}", quote(dir));
        }
        for (name, contents) in &self.files {
            let _ = writeln!(s, "printf '%s' {} > \"$out\"/{}", quote(contents), quote(name));
        }
        let _ = writeln!(s, "exit {}", self.exit_code);
        s
    }

    /// Write the script to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.script()).expect("write fake tool script");
        path
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
