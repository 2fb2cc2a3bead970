//! Session registry: one record per live shell, keyed by pane id.

#[cfg(test)]
pub(crate) mod fake;
pub mod parser;
pub mod pty;
pub mod shell;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

use crate::lifecycle::{CommandTracker, Completion};
use crate::pane::PaneId;
use shell::ShellFamily;

/// Longest display name a pane may carry, in graphemes.
pub const NAME_MAX: usize = 30;

/// Messages from process I/O threads to the registry.
#[derive(Debug)]
pub enum SessionEvent {
    Output { id: PaneId, data: Vec<u8>, at: Instant },
    Exited { id: PaneId },
}

/// What a spawner needs to start one shell.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub cols: u16,
    pub rows: u16,
}

/// Handle to a running shell. Dropping it terminates the process.
pub trait Process {
    fn write(&self, data: &[u8]);
    fn resize(&self, cols: u16, rows: u16);
}

pub trait Spawner {
    /// Shell program this spawner launches.
    fn program(&self) -> &str;

    /// Start a process for pane `id`. Output and exit are reported on `events`.
    fn spawn(
        &self,
        id: PaneId,
        request: &SpawnRequest,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn Process>, Box<dyn std::error::Error>>;
}

/// Options for [`SessionRegistry::create`].
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub name: Option<String>,
    pub cwd: Option<PathBuf>,
    pub auto_run: Option<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Clone, Debug)]
pub struct RegistrySettings {
    pub cols: u16,
    pub rows: u16,
    pub auto_run_delay: Duration,
    pub prompt_hook: bool,
    /// Variables stripped from the inherited environment of every shell.
    pub env_remove: Vec<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            cols: 80,
            rows: 24,
            auto_run_delay: Duration::from_millis(500),
            prompt_hook: true,
            env_remove: Vec::new(),
        }
    }
}

/// Events surfaced to the orchestrator by [`SessionRegistry::poll`].
#[derive(Debug, PartialEq)]
pub enum RegistryEvent {
    Output { id: PaneId, data: Vec<u8> },
    Completed { id: PaneId, completion: Completion },
    Exited { id: PaneId },
}

pub struct TerminalSession {
    pub id: PaneId,
    pub name: String,
    /// Last directory the shell reported; starts as the spawn directory.
    pub cwd: String,
    tracker: CommandTracker,
    /// `None` when the spawn failed; such a session never produces output.
    process: Option<Box<dyn Process>>,
}

impl TerminalSession {
    pub fn is_alive(&self) -> bool {
        self.process.is_some()
    }

    pub fn tracker(&self) -> &CommandTracker {
        &self.tracker
    }
}

struct PendingWrite {
    id: PaneId,
    due: Instant,
    command: String,
}

pub struct SessionRegistry {
    spawner: Box<dyn Spawner>,
    settings: RegistrySettings,
    sessions: BTreeMap<PaneId, TerminalSession>,
    next_id: PaneId,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    auto_runs: Vec<PendingWrite>,
}

impl SessionRegistry {
    pub fn init(spawner: Box<dyn Spawner>, settings: RegistrySettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        SessionRegistry {
            spawner,
            settings,
            sessions: BTreeMap::new(),
            next_id: 1,
            events_tx,
            events_rx,
            auto_runs: Vec::new(),
        }
    }

    /// Spawn a shell and register it. Always returns a fresh id, even if the
    /// spawn failed (the session is then inert).
    pub fn create(&mut self, options: SessionOptions, now: Instant) -> PaneId {
        let id = self.next_id;
        self.next_id += 1;

        let program = self.spawner.program().to_string();
        let cwd = options.cwd.unwrap_or_else(default_cwd);
        let request = SpawnRequest {
            cwd: cwd.clone(),
            env: options.env,
            env_remove: self.settings.env_remove.clone(),
            cols: self.settings.cols,
            rows: self.settings.rows,
        };

        let process = match self.spawner.spawn(id, &request, self.events_tx.clone()) {
            Ok(process) => Some(process),
            Err(e) => {
                log::warn!("Failed to spawn {} for pane {}: {}", program, id, e);
                None
            }
        };

        if let Some(process) = &process {
            if self.settings.prompt_hook {
                if let Some(hook) = ShellFamily::detect(&program).prompt_hook() {
                    process.write(hook.as_bytes());
                }
            }
            if let Some(command) = options.auto_run.filter(|c| !c.trim().is_empty()) {
                self.auto_runs.push(PendingWrite {
                    id,
                    due: now + self.settings.auto_run_delay,
                    command,
                });
            }
        }

        let name = options
            .name
            .and_then(|n| clean_name(&n))
            .unwrap_or_else(|| format!("{} {}", shell::display_name(&program), id));

        self.sessions.insert(
            id,
            TerminalSession {
                id,
                name,
                cwd: cwd.to_string_lossy().into_owned(),
                tracker: CommandTracker::new(),
                process,
            },
        );
        id
    }

    pub fn contains(&self, id: PaneId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: PaneId) -> Option<&TerminalSession> {
        self.sessions.get(&id)
    }

    pub fn ids(&self) -> Vec<PaneId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn name(&self, id: PaneId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.name.as_str())
    }

    /// Set a new display name. Blank input keeps the current one.
    pub fn rename(&mut self, id: PaneId, name: &str) -> bool {
        let (Some(session), Some(name)) = (self.sessions.get_mut(&id), clean_name(name)) else {
            return false;
        };
        session.name = name;
        true
    }

    pub fn cwd(&self, id: PaneId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.cwd.as_str())
    }

    pub fn working_directories(&self) -> BTreeMap<PaneId, String> {
        self.sessions.iter().map(|(id, s)| (*id, s.cwd.clone())).collect()
    }

    /// Send bytes to the shell and let the lifecycle tracker see them.
    pub fn write(&mut self, id: PaneId, data: &[u8], now: Instant) {
        let Some(session) = self.sessions.get_mut(&id) else { return };
        if let Some(process) = &session.process {
            process.write(data);
        }
        session.tracker.on_input(data, now);
    }

    pub fn resize(&mut self, id: PaneId, cols: u16, rows: u16) {
        if let Some(process) = self.sessions.get(&id).and_then(|s| s.process.as_ref()) {
            process.resize(cols, rows);
        }
    }

    pub fn resize_all(&mut self, cols: u16, rows: u16) {
        self.settings.cols = cols;
        self.settings.rows = rows;
        for session in self.sessions.values() {
            if let Some(process) = &session.process {
                process.resize(cols, rows);
            }
        }
    }

    /// Terminate the process and drop the record, timers and buffers included.
    pub fn close(&mut self, id: PaneId) -> bool {
        self.auto_runs.retain(|w| w.id != id);
        match self.sessions.remove(&id) {
            Some(session) => {
                log::info!("Closing session {} ({})", id, session.name);
                true
            }
            None => false,
        }
    }

    /// Kill every live process.
    pub fn shutdown(&mut self) {
        log::info!("Shutting down {} session(s)", self.sessions.len());
        self.auto_runs.clear();
        self.sessions.clear();
    }

    /// Deliver due auto-run commands, drain process events, and fire expired
    /// idle timers.
    pub fn poll(&mut self, now: Instant) -> Vec<RegistryEvent> {
        let mut out = Vec::new();

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.auto_runs)
            .into_iter()
            .partition(|w| w.due <= now);
        self.auto_runs = pending;
        for write in due {
            log::debug!("auto-run for pane {}: {}", write.id, write.command);
            self.write(write.id, format!("{}\r", write.command).as_bytes(), now);
        }

        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::Output { id, data, at } => {
                    let Some(session) = self.sessions.get_mut(&id) else { continue };
                    // A timer that expired before this chunk was read fires first.
                    if let Some(completion) = session.tracker.poll(at) {
                        out.push(RegistryEvent::Completed { id, completion });
                    }
                    let outcome = session.tracker.on_output(&data, at);
                    if let Some(cwd) = outcome.cwd {
                        session.cwd = cwd;
                    }
                    out.push(RegistryEvent::Output { id, data });
                    if let Some(completion) = outcome.completion {
                        out.push(RegistryEvent::Completed { id, completion });
                    }
                }
                SessionEvent::Exited { id } => {
                    if let Some(session) = self.sessions.remove(&id) {
                        log::info!("Shell for pane {} ({}) exited", id, session.name);
                        self.auto_runs.retain(|w| w.id != id);
                        out.push(RegistryEvent::Exited { id });
                    }
                }
            }
        }

        for (id, session) in self.sessions.iter_mut() {
            if let Some(completion) = session.tracker.poll(now) {
                out.push(RegistryEvent::Completed { id: *id, completion });
            }
        }
        out
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            self.shutdown();
        }
    }
}

fn default_cwd() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Trim and cap a user-supplied pane name. `None` when nothing is left.
pub fn clean_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.graphemes(true).take(NAME_MAX).collect())
}
