use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, ProcessRefreshKind, RefreshKind, Signal, System};
use tracing::info;

/// The standalone daemon binary installed next to the CLI.
pub fn daemon_executable(cli: &Path) -> PathBuf {
    let mut path = cli.to_path_buf();
    path.set_file_name("typetrace-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

/// Executables whose running instances count as a typetrace server.
pub fn server_executables() -> Result<Vec<PathBuf>> {
    let cli = env::current_exe()?;
    let daemon = daemon_executable(&cli);
    Ok(vec![cli, daemon])
}

/// Terminates every other process started from one of `executables` and returns how many were
/// stopped.
pub fn kill_previous_servers(executables: &[PathBuf]) -> Result<usize> {
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_exe(
            sysinfo::UpdateKind::OnlyIfNotSet,
        )),
    );
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own pid {e}"))?;
    let mut stopped = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .is_some_and(|exe| executables.iter().any(|e| e == exe))
        {
            info!("Stopping server {pid}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}

/// Shuts down previous servers and starts a new one running `serve` in a detached process.
pub fn restart_server(dir: Option<&Path>, input: Option<&Path>) -> Result<()> {
    let process_name = env::current_exe()?;
    kill_previous_servers(&server_executables()?)?;
    let mut command = std::process::Command::new(process_name);
    command.arg("serve");
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }
    if let Some(input) = input {
        command.arg("--input").arg(input);
    }

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
    }

    println!("Spawning");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Success");
    Ok(())
}
