//! One-shot interpreter processes: a fresh temporary directory, an empty
//! environment, piped stdio and a wall-clock race against the budget.
//!
//! On Unix every run leads its own process group, which is killed as a whole
//! once the run is over. Between fork and exec the child is confined: on
//! Linux it gets private network, IPC and mount namespaces with the usual
//! writable mounts remounted read-only, and a child started as root drops to
//! `nobody` before the interpreter is exec'd.

use crate::{Limits, SandboxError};
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
/// uid and gid of `nobody`, used when the server itself runs as root.
#[cfg(unix)]
const UNPRIVILEGED_ID: u32 = 65534;
#[cfg(target_os = "linux")]
const READ_ONLY_MOUNTS: [&str; 6] = ["/", "/tmp", "/var/tmp", "/dev/shm", "/home", "/root"];
const TRUNCATED_MARKER: &str = "\n[output truncated]\n";
// Readers get this long to drain the pipes once the child is gone.
const READER_GRACE: Duration = Duration::from_millis(250);

pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: &'a str,
    /// Files materialised in the run directory before spawning.
    pub files: Vec<(&'static str, &'static str)>,
    /// `RLIMIT_AS` in bytes.
    pub memory_limit: Option<u64>,
    /// `RLIMIT_NPROC`.
    pub process_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
pub struct ProcessReport {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

struct Capture {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }))
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn take(&mut self) -> String {
        let mut text = String::from_utf8_lossy(&self.buf).into_owned();
        if self.truncated {
            text.push_str(TRUNCATED_MARKER);
        }
        text
    }
}

fn spawn_reader<R>(mut stream: R, capture: Arc<Mutex<Capture>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                // Past the cap the pipe is still drained so the child never blocks on it.
                Ok(n) => capture.lock().push(&chunk[..n]),
            }
        }
    })
}

async fn finish_reader(mut handle: JoinHandle<()>) {
    if tokio::time::timeout(READER_GRACE, &mut handle).await.is_err() {
        log::debug!("output reader still open after the child exited");
        handle.abort();
    }
}

/// Whether `program --version` starts and succeeds under the run environment.
pub async fn interpreter_available(program: &str) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg("--version")
        .env_clear()
        .env("PATH", SANDBOX_PATH)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    matches!(
        tokio::time::timeout(Duration::from_secs(5), cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

#[derive(Debug, Clone, Copy)]
struct Confinement {
    cpu_seconds: u64,
    memory_limit: Option<u64>,
    process_limit: Option<u64>,
}

#[cfg(target_os = "linux")]
fn isolate_namespaces() {
    use nix::mount::{mount, MsFlags};
    use nix::sched::{unshare, CloneFlags};
    use nix::unistd::Uid;

    let mut flags = CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWIPC;
    if !Uid::effective().is_root() {
        flags |= CloneFlags::CLONE_NEWUSER;
    }
    // Kernels or containers without namespace support still get the rest.
    if unshare(flags).is_err() {
        return;
    }
    let none: Option<&str> = None;
    if mount(none, "/", none, MsFlags::MS_REC | MsFlags::MS_PRIVATE, none).is_err() {
        return;
    }
    for target in READ_ONLY_MOUNTS.iter() {
        // Paths that are not mount points fail with EINVAL and are left alone.
        let _ = mount(
            none,
            *target,
            none,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
            none,
        );
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn isolate_namespaces() {}

#[cfg(target_os = "linux")]
fn forbid_new_privileges() -> std::io::Result<()> {
    if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn forbid_new_privileges() -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn drop_privileges() -> std::io::Result<()> {
    use nix::unistd::{setgid, setgroups, setuid, Gid, Uid};

    if !Uid::effective().is_root() {
        return Ok(());
    }
    let gid = Gid::from_raw(UNPRIVILEGED_ID);
    setgroups(&[gid])?;
    setgid(gid)?;
    setuid(Uid::from_raw(UNPRIVILEGED_ID))?;
    Ok(())
}

#[cfg(unix)]
fn confine(cmd: &mut Command, confinement: Confinement) {
    use rlimit::{setrlimit, Resource};

    cmd.process_group(0);
    // Only async-signal-safe work happens between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            isolate_namespaces();
            let cpu = confinement.cpu_seconds;
            setrlimit(Resource::CPU, cpu, cpu + 1)?;
            setrlimit(Resource::FSIZE, 0, 0)?;
            setrlimit(Resource::CORE, 0, 0)?;
            if let Some(bytes) = confinement.memory_limit {
                setrlimit(Resource::AS, bytes, bytes)?;
            }
            if let Some(count) = confinement.process_limit {
                setrlimit(Resource::NPROC, count, count)?;
            }
            drop_privileges()?;
            forbid_new_privileges()
        });
    }
}

#[cfg(not(unix))]
fn confine(_cmd: &mut Command, _confinement: Confinement) {}

/// Kills whatever is left of the run's process group.
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let leader = match leader.and_then(|pid| i32::try_from(pid).ok()) {
        Some(pid) => pid,
        None => return,
    };
    match killpg(Pid::from_raw(leader), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("failed to kill process group {}: {}", leader, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>) {}

/// The run directory and its files are read by an unprivileged child.
#[cfg(unix)]
fn open_workdir(path: &std::path::Path) -> std::io::Result<()> {
    use std::fs::{read_dir, set_permissions, Permissions};
    use std::os::unix::fs::PermissionsExt;

    for entry in read_dir(path)? {
        set_permissions(entry?.path(), Permissions::from_mode(0o644))?;
    }
    set_permissions(path, Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn open_workdir(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

pub async fn run_isolated(
    spec: ProcessSpec<'_>,
    limits: &Limits,
    cancel: &CancellationToken,
) -> Result<ProcessReport, SandboxError> {
    // Removed when dropped at the end of the run.
    let workdir = tempfile::Builder::new()
        .prefix("codepad-run-")
        .tempdir()
        .map_err(SandboxError::Workspace)?;
    for (name, contents) in &spec.files {
        std::fs::write(workdir.path().join(name), contents).map_err(SandboxError::Workspace)?;
    }
    open_workdir(workdir.path()).map_err(SandboxError::Workspace)?;

    let mut cmd = Command::new(spec.program);
    cmd.args(&spec.args)
        .current_dir(workdir.path())
        .env_clear()
        .env("PATH", SANDBOX_PATH)
        .env("LANG", "C.UTF-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    confine(
        &mut cmd,
        Confinement {
            cpu_seconds: limits.timeout.as_secs() + 1,
            memory_limit: spec.memory_limit,
            process_limit: spec.process_limit,
        },
    );

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: spec.program.to_owned(),
        source,
    })?;
    let leader = child.id();

    if let Some(mut stdin) = child.stdin.take() {
        let source = spec.stdin.as_bytes().to_vec();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&source).await {
                log::debug!("child closed stdin early: {}", e);
            }
        });
    }

    let stdout = Capture::new(limits.max_output_bytes);
    let stderr = Capture::new(limits.max_output_bytes);
    let readers = (
        child.stdout.take().map(|s| spawn_reader(s, stdout.clone())),
        child.stderr.take().map(|s| spawn_reader(s, stderr.clone())),
    );

    let termination = tokio::select! {
        status = child.wait() => Termination::Exited(status.map_err(SandboxError::Wait)?),
        _ = tokio::time::sleep(limits.timeout) => Termination::TimedOut,
        _ = cancel.cancelled() => Termination::Cancelled,
    };
    let elapsed = started.elapsed();

    // Background processes the run left behind go too, whatever the outcome.
    kill_group(leader);
    if let Termination::TimedOut | Termination::Cancelled = termination {
        // Reaps, so a late exit can no longer be observed.
        if let Err(e) = child.kill().await {
            log::warn!("failed to kill {}: {}", spec.program, e);
        }
    }

    if let Some(handle) = readers.0 {
        finish_reader(handle).await;
    }
    if let Some(handle) = readers.1 {
        finish_reader(handle).await;
    }

    let stdout = stdout.lock().take();
    let stderr = stderr.lock().take();
    Ok(ProcessReport {
        termination,
        stdout,
        stderr,
        elapsed,
    })
}
