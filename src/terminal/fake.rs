//! In-memory spawner for tests: records what the registry does to each
//! process and lets a test inject output and exits.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;

use super::{Process, SessionEvent, SpawnRequest, Spawner};
use crate::pane::PaneId;

#[derive(Default)]
struct FakeState {
    requests: HashMap<PaneId, SpawnRequest>,
    senders: HashMap<PaneId, Sender<SessionEvent>>,
    written: HashMap<PaneId, Vec<u8>>,
    sizes: HashMap<PaneId, (u16, u16)>,
    killed: Vec<PaneId>,
    fail_next: bool,
}

#[derive(Clone)]
pub struct FakeSpawner {
    program: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSpawner {
    pub fn new(program: &str) -> Self {
        FakeSpawner {
            program: program.to_string(),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn fail_next_spawn(&self) {
        self.state.lock().fail_next = true;
    }

    pub fn request(&self, id: PaneId) -> Option<SpawnRequest> {
        self.state.lock().requests.get(&id).cloned()
    }

    pub fn spawned(&self) -> Vec<PaneId> {
        let mut ids: Vec<_> = self.state.lock().requests.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn written(&self, id: PaneId) -> Vec<u8> {
        self.state.lock().written.get(&id).cloned().unwrap_or_default()
    }

    pub fn clear_written(&self, id: PaneId) {
        self.state.lock().written.remove(&id);
    }

    pub fn size(&self, id: PaneId) -> Option<(u16, u16)> {
        self.state.lock().sizes.get(&id).copied()
    }

    pub fn killed(&self, id: PaneId) -> bool {
        self.state.lock().killed.contains(&id)
    }

    /// Deliver an output chunk as if the shell printed it at `at`.
    pub fn emit(&self, id: PaneId, data: &[u8], at: Instant) {
        if let Some(tx) = self.state.lock().senders.get(&id) {
            let _ = tx.send(SessionEvent::Output { id, data: data.to_vec(), at });
        }
    }

    /// Report the process as exited.
    pub fn exit(&self, id: PaneId) {
        if let Some(tx) = self.state.lock().senders.get(&id) {
            let _ = tx.send(SessionEvent::Exited { id });
        }
    }
}

impl Spawner for FakeSpawner {
    fn program(&self) -> &str {
        &self.program
    }

    fn spawn(
        &self,
        id: PaneId,
        request: &SpawnRequest,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn Process>, Box<dyn std::error::Error>> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err("no such file or directory".into());
        }
        state.requests.insert(id, request.clone());
        state.senders.insert(id, events);
        state.sizes.insert(id, (request.cols, request.rows));
        Ok(Box::new(FakeProcess { id, state: self.state.clone() }))
    }
}

struct FakeProcess {
    id: PaneId,
    state: Arc<Mutex<FakeState>>,
}

impl Process for FakeProcess {
    fn write(&self, data: &[u8]) {
        self.state.lock().written.entry(self.id).or_default().extend_from_slice(data);
    }

    fn resize(&self, cols: u16, rows: u16) {
        self.state.lock().sizes.insert(self.id, (cols, rows));
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.state.lock().killed.push(self.id);
    }
}
