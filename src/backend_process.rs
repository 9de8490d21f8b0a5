//! Ownership of the single backend child process.
//!
//! [`BackendSupervisor`] is the only component allowed to start or stop the
//! backend. Output is forwarded line by line into `tracing` under the
//! `backend` target, and exit is detected by a watcher thread that polls the
//! child. A crashed backend is logged and never restarted.

use std::{
    io::{BufRead, BufReader, Read},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use crate::{LaunchError, LaunchPlan, BACKEND_EXIT_WATCH_INTERVAL};

#[derive(Debug)]
struct RunningBackend {
    child: Child,
    generation: u64,
}

#[derive(Debug, Default)]
struct SupervisorInner {
    running: Mutex<Option<RunningBackend>>,
    alive: AtomicBool,
    generation: AtomicU64,
}

impl SupervisorInner {
    fn lock(&self) -> MutexGuard<'_, Option<RunningBackend>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct BackendSupervisor {
    inner: Arc<SupervisorInner>,
    watch_interval: Duration,
}

impl Default for BackendSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendSupervisor {
    pub fn new() -> Self {
        Self::with_watch_interval(BACKEND_EXIT_WATCH_INTERVAL)
    }

    pub fn with_watch_interval(watch_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SupervisorInner::default()),
            watch_interval,
        }
    }

    /// Spawns the backend and returns its pid without waiting for readiness.
    pub fn start(&self, plan: &LaunchPlan) -> Result<u32, LaunchError> {
        let mut guard = self.inner.lock();
        if let Some(running) = guard.as_ref() {
            return Err(LaunchError::AlreadyRunning(running.child.id()));
        }

        let mut command = Command::new(&plan.cmd);
        command
            .args(&plan.args)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &plan.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| {
            tracing::error!(
                command = ?plan.debug_command(),
                error = %source,
                "failed to spawn backend process"
            );
            LaunchError::Spawn {
                command: plan.debug_command(),
                source,
            }
        })?;

        let pid = child.id();
        tracing::info!(
            pid,
            packaged = plan.packaged_mode,
            command = ?plan.debug_command(),
            "backend process started"
        );

        if let Some(stdout) = child.stdout.take() {
            forward_output("backend-stdout", stdout, OutputStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output("backend-stderr", stderr, OutputStream::Stderr);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *guard = Some(RunningBackend { child, generation });
        self.inner.alive.store(true, Ordering::Release);
        drop(guard);

        spawn_exit_watcher(Arc::clone(&self.inner), generation, self.watch_interval);
        Ok(pid)
    }

    /// Best-effort termination. Calling it with nothing running is a no-op.
    pub fn stop(&self) {
        let running = self.inner.lock().take();
        self.inner.alive.store(false, Ordering::Release);

        if let Some(mut running) = running {
            tracing::info!(pid = running.child.id(), "stopping backend process");
            match stop_child_process(&mut running.child) {
                Some(status) => log_exit_status(status),
                None => tracing::warn!("backend process did not report an exit status"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().as_ref().map(|running| running.child.id())
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

fn forward_output<R>(thread_name: &str, stream: R, kind: OutputStream)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else {
                    break;
                };
                match kind {
                    OutputStream::Stdout => tracing::info!(target: "backend", "{line}"),
                    OutputStream::Stderr => tracing::warn!(target: "backend", "{line}"),
                }
            }
        });
    if let Err(error) = spawned {
        tracing::warn!(%error, thread_name, "failed to start backend output forwarder");
    }
}

fn spawn_exit_watcher(inner: Arc<SupervisorInner>, generation: u64, interval: Duration) {
    let spawned = thread::Builder::new()
        .name("backend-exit-watch".to_string())
        .spawn(move || loop {
            thread::sleep(interval);

            let mut guard = inner.lock();
            let Some(running) = guard.as_mut() else {
                return;
            };
            if running.generation != generation {
                return;
            }

            match running.child.try_wait() {
                Ok(Some(status)) => {
                    guard.take();
                    inner.alive.store(false, Ordering::Release);
                    drop(guard);
                    log_exit_status(status);
                    return;
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(%error, "failed to poll backend process status");
                }
            }
        });
    if let Err(error) = spawned {
        tracing::warn!(%error, "failed to start backend exit watcher");
    }
}

fn log_exit_status(status: ExitStatus) {
    match status.code() {
        Some(0) => tracing::info!(code = 0, "backend process exited"),
        Some(code) => tracing::warn!(code, "backend process exited"),
        None => tracing::warn!(%status, "backend process terminated by signal"),
    }
}

#[cfg(target_os = "windows")]
fn stop_child_process(child: &mut Child) -> Option<ExitStatus> {
    // The packaged backend spawns its own workers; kill the whole tree.
    let _ = Command::new("taskkill")
        .args(["/pid", &child.id().to_string(), "/t", "/f"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .status();
    child.wait().ok()
}

#[cfg(not(target_os = "windows"))]
fn stop_child_process(child: &mut Child) -> Option<ExitStatus> {
    let _ = child.kill();
    child.wait().ok()
}
