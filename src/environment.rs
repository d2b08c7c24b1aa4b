//! src/environment.rs
use std::path::Path;

use once_cell::sync::Lazy;

/// True when the current process is running inside a Docker container.
pub static IN_DOCKER: Lazy<bool> =
    Lazy::new(|| detect_docker(Path::new("/.dockerenv"), Path::new("/proc/self/cgroup")));

/// True when the current process is running on Linux.
pub const LINUX: bool = cfg!(target_os = "linux");

/// True when the current process is running on macOS.
pub const MACOS: bool = cfg!(target_os = "macos");

/// True when the current process is running on Windows.
pub const WINDOWS: bool = cfg!(target_os = "windows");

/// Operating system name, e.g. `linux` or `macos`.
pub const OS: &str = std::env::consts::OS;

/// The number of CPUs available to the current process, or 1 when the
/// parallelism cannot be determined.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

fn detect_docker(dockerenv: &Path, cgroup: &Path) -> bool {
    if dockerenv.exists() {
        return true;
    }

    match std::fs::read_to_string(cgroup) {
        Ok(contents) => contents.lines().any(|line| line.contains("docker")),
        Err(_) => false,
    }
}
