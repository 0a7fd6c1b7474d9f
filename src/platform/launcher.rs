//! Relaunch support for the host platform.

use super::{LaunchTarget, Launcher};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// The running executable and the arguments it was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentProcess {
    /// Path of the running executable
    pub executable: PathBuf,
    /// Command line arguments after the program name
    pub args: Vec<String>,
}

impl CurrentProcess {
    /// This process, if its executable can be located.
    pub fn detect() -> Option<Self> {
        let executable = std::env::current_exe().ok()?;
        let args = std::env::args_os()
            .skip(1)
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        Some(Self {
            executable,
            args,
        })
    }
}

/// Starts the application as a detached child process.
///
/// The launch entry point is the configured `launch_command` when present,
/// otherwise the installed package executable in the install directory. When
/// that executable is the running process itself, it is started again with
/// the current command line.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    install_dir: PathBuf,
    launch_command: Option<Vec<String>>,
    current: Option<CurrentProcess>,
}

impl ProcessLauncher {
    /// Launcher for packages installed in `install_dir`.
    pub fn new(install_dir: PathBuf, launch_command: Option<Vec<String>>) -> Self {
        Self {
            install_dir,
            launch_command,
            current: None,
        }
    }

    /// Relaunch `current` with its own arguments when it is the updated package.
    pub fn with_current_process(mut self, current: Option<CurrentProcess>) -> Self {
        self.current = current;
        self
    }

    /// Whether updating `package` replaces the running executable.
    pub fn relaunches_self(&self, package: &str) -> bool {
        self.launch_command.is_none() && self.running_as(&self.installed_path(package)).is_some()
    }

    fn installed_path(&self, package: &str) -> PathBuf {
        self.install_dir.join(format!("{package}{}", std::env::consts::EXE_SUFFIX))
    }

    fn running_as(&self, installed: &Path) -> Option<&CurrentProcess> {
        self.current.as_ref().filter(|current| same_file(&current.executable, installed))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl Launcher for ProcessLauncher {
    fn launch_entry_point(&self, package: &str) -> Option<LaunchTarget> {
        if let Some((program, args)) =
            self.launch_command.as_ref().and_then(|command| command.split_first())
        {
            // Bare command names are looked up on PATH
            let program = if program.contains(std::path::MAIN_SEPARATOR) {
                PathBuf::from(program)
            } else {
                which::which(program).ok()?
            };
            return Some(LaunchTarget {
                program,
                args: args.to_vec(),
            });
        }

        let installed = self.installed_path(package);
        if !installed.is_file() {
            return None;
        }
        let args =
            self.running_as(&installed).map(|current| current.args.clone()).unwrap_or_default();
        Some(LaunchTarget {
            program: installed,
            args,
        })
    }

    fn start(&self, target: &LaunchTarget) -> io::Result<()> {
        let child = Command::new(&target.program)
            .args(&target.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!("Started {} as pid {}", target.program.display(), child.id());
        Ok(())
    }
}
