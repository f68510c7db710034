//! `idf.py` wrappers. The export script has to be sourced in the same shell
//! as `idf.py`, so each run is one shell invocation with inherited stdio.

use crate::error::DiagError;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info};

pub const ENV_IDF_PATH: &str = "IDF_PATH";
pub const ENV_COM_PORT: &str = "ESP32_COM_PORT";
pub const ENV_PROJECT_DIR: &str = "HA_PROBE_PROJECT_DIR";

#[cfg(windows)]
pub const DEFAULT_COM_PORT: &str = "COM13";
#[cfg(not(windows))]
pub const DEFAULT_COM_PORT: &str = "/dev/ttyUSB0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn export_script_name(self) -> &'static str {
        match self {
            Platform::Windows => "export.bat",
            Platform::Unix => "export.sh",
        }
    }
}

/// Shell program plus the single script line it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub flag: &'static str,
    pub script: String,
}

impl Invocation {
    pub fn new(platform: Platform, export_script: &Path, idf_args: &[String]) -> Self {
        let export = export_script.display();
        match platform {
            Platform::Windows => Invocation {
                program: "cmd.exe",
                flag: "/c",
                script: format!("call \"{export}\" && idf.py {}", idf_args.join(" ")),
            },
            Platform::Unix => {
                let args: Vec<String> = idf_args.iter().map(|arg| sh_quote(arg)).collect();
                Invocation {
                    program: "bash",
                    flag: "-c",
                    script: format!(". \"{export}\" && idf.py {}", args.join(" ")),
                }
            }
        }
    }

    /// Command line as it would be typed, for the console header.
    pub fn display_line(&self) -> String {
        match self.program {
            "cmd.exe" => format!("{} {} \"{}\"", self.program, self.flag, self.script),
            _ => format!("{} {} {}", self.program, self.flag, sh_quote(&self.script)),
        }
    }

    fn into_command(self) -> Command {
        let mut command = Command::new(self.program);
        command.arg(self.flag);
        // cmd.exe does its own quote parsing; hand it the line verbatim.
        #[cfg(windows)]
        command.raw_arg(format!("\"{}\"", self.script));
        #[cfg(not(windows))]
        command.arg(self.script);
        command
    }
}

fn sh_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Exited(u8),
    Interrupted,
}

/// An ESP-IDF installation and the firmware project it builds.
#[derive(Debug, Clone)]
pub struct Toolchain {
    platform: Platform,
    idf_path: PathBuf,
    project_dir: PathBuf,
}

impl Toolchain {
    /// A missing toolchain root is a setup failure (exit 2).
    pub fn new(idf_path: Option<PathBuf>, project_dir: impl Into<PathBuf>) -> Result<Self, DiagError> {
        let idf_path = idf_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| DiagError::Toolchain {
                message: format!("ESP-IDF location unknown; pass --idf-path or set {ENV_IDF_PATH}"),
                exit_code: 2,
            })?;
        Ok(Self {
            platform: Platform::current(),
            idf_path,
            project_dir: project_dir.into(),
        })
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn export_script(&self) -> PathBuf {
        self.idf_path.join(self.platform.export_script_name())
    }

    pub fn invocation(&self, idf_args: &[String]) -> Result<Invocation, DiagError> {
        let export = self.export_script();
        if !export.is_file() {
            return Err(DiagError::Toolchain {
                message: format!("IDF export script not found at: {}", export.display()),
                exit_code: 1,
            });
        }
        Ok(Invocation::new(self.platform, &export, idf_args))
    }

    /// Runs `idf.py <args>` in the project directory and waits for it. Ctrl-C
    /// stops the wait; the child receives the same console signal.
    pub async fn run(&self, idf_args: &[String]) -> Result<RunOutcome, DiagError> {
        let invocation = self.invocation(idf_args)?;
        info!(target: "ha_probe::toolchain", command = %invocation.display_line(), dir = %self.project_dir.display(), "spawning");
        let mut command = invocation.into_command();
        command.current_dir(&self.project_dir);
        let mut child = command.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                debug!(target: "ha_probe::toolchain", ?status, "subprocess finished");
                Ok(RunOutcome::Exited(exit_code(status)))
            }
            _ = crate::user_interrupt() => Ok(RunOutcome::Interrupted),
        }
    }

    pub async fn build(&self) -> Result<RunOutcome, DiagError> {
        self.run(&["build".to_string()]).await
    }

    pub async fn flash(&self, port: &str) -> Result<RunOutcome, DiagError> {
        self.run(&flash_args(port)).await
    }
}

pub fn flash_args(port: &str) -> Vec<String> {
    vec![
        "-p".to_string(),
        port.to_string(),
        "flash".to_string(),
        "monitor".to_string(),
    ]
}

/// Exit status as a process exit code; signal termination maps to 1.
fn exit_code(status: ExitStatus) -> u8 {
    status
        .code()
        .map(|code| u8::try_from(code).unwrap_or(1))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_line_calls_export_batch() {
        let line = Invocation::new(
            Platform::Windows,
            Path::new(r"C:\Espressif\frameworks\esp-idf-v5.5\export.bat"),
            &["build".to_string()],
        );
        assert_eq!(line.program, "cmd.exe");
        assert_eq!(
            line.script,
            r#"call "C:\Espressif\frameworks\esp-idf-v5.5\export.bat" && idf.py build"#
        );
    }

    #[test]
    fn unix_line_sources_export_script() {
        let line = Invocation::new(
            Platform::Unix,
            Path::new("/opt/esp idf/export.sh"),
            &flash_args("/dev/ttyUSB0"),
        );
        assert_eq!(line.program, "bash");
        assert_eq!(line.flag, "-c");
        assert_eq!(
            line.script,
            r#". "/opt/esp idf/export.sh" && idf.py -p /dev/ttyUSB0 flash monitor"#
        );
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn missing_idf_path_is_setup_failure() {
        let err = Toolchain::new(None, ".").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn missing_export_script_exits_one() {
        let idf = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new(Some(idf.path().to_path_buf()), ".")
            .unwrap()
            .with_platform(Platform::Unix);
        match toolchain.invocation(&["build".to_string()]) {
            Err(err @ DiagError::Toolchain { .. }) => {
                assert_eq!(err.exit_code(), 1);
                assert!(err.to_string().contains("export.sh"));
            }
            other => panic!("expected toolchain error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test_timeout::timeout]
    async fn runs_idf_in_project_dir_and_mirrors_exit_code() {
        let idf = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        std::fs::write(
            idf.path().join("export.sh"),
            "idf.py() { echo \"$@\" > invoked.txt; return 3; }\n",
        )
        .unwrap();

        let toolchain = Toolchain::new(Some(idf.path().to_path_buf()), project.path()).unwrap();
        let outcome = toolchain.flash("/dev/ttyACM0").await.unwrap();
        assert_eq!(outcome, RunOutcome::Exited(3));
        let invoked = std::fs::read_to_string(project.path().join("invoked.txt")).unwrap();
        assert_eq!(invoked.trim(), "-p /dev/ttyACM0 flash monitor");
    }
}
