//! Pane orchestration: turns user gestures into layout tree edits plus
//! session registry calls, and turns session events into UI events,
//! chained commands and notifications.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chain::{ChainRule, ChainRules};
use crate::config::Config;
use crate::geometry::{DropZone, PaneViewport, drop_zone, resize_ratio};
use crate::lifecycle::Completion;
use crate::notify::{NOTIFY_KEY, Notification, NotifySettings};
use crate::pane::{NodeId, NodeKind, PaneId, SplitDirection, SplitTree};
use crate::session::{LAYOUT_KEY, LayoutNode, RestoreError, SaveDebouncer};
use crate::store::Store;
use crate::terminal::{RegistryEvent, SessionOptions, SessionRegistry, Spawner};

pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Signals for the rendering surface, collected until `drain_events`.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// The layout changed; re-resolve viewports.
    Render,
    Output { pane: PaneId, data: Vec<u8> },
    Exited { pane: PaneId },
    Focus { pane: PaneId },
    Notify(Notification),
}

pub struct Workspace {
    tree: SplitTree,
    registry: SessionRegistry,
    store: Box<dyn Store>,
    clock: Box<dyn Clock>,
    chains: ChainRules,
    notify: NotifySettings,
    focused: Option<PaneId>,
    /// Extra variables handed to every new shell.
    env: Vec<(String, String)>,
    save: SaveDebouncer,
    events: Vec<UiEvent>,
}

impl Workspace {
    pub fn new(config: &Config, spawner: Box<dyn Spawner>, store: Box<dyn Store>, clock: Box<dyn Clock>) -> Self {
        let notify = store
            .load(NOTIFY_KEY)
            .and_then(|value| match serde_json::from_value(value) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("Ignoring saved notification settings: {}", e);
                    None
                }
            })
            .unwrap_or_else(|| config.notify_defaults());

        Workspace {
            tree: SplitTree::new(),
            registry: SessionRegistry::init(spawner, config.registry_settings()),
            store,
            clock,
            chains: ChainRules::new(),
            notify,
            focused: None,
            env: Vec::new(),
            save: SaveDebouncer::new(config.save_debounce()),
            events: Vec::new(),
        }
    }

    pub fn tree(&self) -> &SplitTree {
        &self.tree
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn focused(&self) -> Option<PaneId> {
        self.focused
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.events)
    }

    /// Restore the saved layout, or open one pane when there is none.
    pub fn startup(&mut self) {
        if let Some(doc) = self.store.load(LAYOUT_KEY) {
            match self.restore_layout(&doc) {
                Ok(count) => log::info!("Restored layout with {} pane(s)", count),
                Err(RestoreError::Empty) => {}
                Err(e) => log::warn!("Could not restore layout: {}", e),
            }
        }
        if self.tree.is_empty() {
            self.new_pane();
        }
    }

    /// Save the layout and kill every shell.
    pub fn shutdown(&mut self) {
        self.save_now();
        self.registry.shutdown();
    }

    /// Start a shell that is not yet placed in the layout.
    pub fn create_terminal(&mut self, cwd: Option<PathBuf>, auto_run: Option<String>) -> PaneId {
        self.spawn(SessionOptions { cwd, auto_run, ..Default::default() })
    }

    fn spawn(&mut self, mut options: SessionOptions) -> PaneId {
        options.env = self.env.clone();
        let now = self.clock.now();
        self.registry.create(options, now)
    }

    /// Root pane when the layout is empty, otherwise a side-by-side split of
    /// the focused pane.
    pub fn new_pane(&mut self) -> PaneId {
        let id = self.spawn(SessionOptions::default());
        self.place(id);
        id
    }

    /// New pane named after `dir` and started in it.
    pub fn open_directory(&mut self, dir: &Path, auto_run: Option<String>) -> PaneId {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let id = self.spawn(SessionOptions {
            name: Some(name),
            cwd: Some(dir.to_path_buf()),
            auto_run,
            ..Default::default()
        });
        self.place(id);
        id
    }

    fn place(&mut self, id: PaneId) {
        let target = self.focused.and_then(|p| self.tree.find_leaf(p));
        match target.or_else(|| self.tree.first_pane().and_then(|p| self.tree.find_leaf(p))) {
            Some(leaf) => {
                self.tree.split(leaf, SplitDirection::Horizontal, id);
            }
            None => {
                let leaf = self.tree.create_leaf(id);
                self.tree.set_root(leaf);
            }
        }
        self.changed();
        self.focus(id);
    }

    /// Split `pane`, putting a new shell second (right or below).
    pub fn split_pane(&mut self, pane: PaneId, direction: SplitDirection) -> Option<PaneId> {
        let leaf = self.tree.find_leaf(pane)?;
        let id = self.spawn(SessionOptions::default());
        self.tree.split(leaf, direction, id);
        self.changed();
        self.focus(id);
        Some(id)
    }

    /// Kill the shell and take the pane out of the layout.
    pub fn close_pane(&mut self, pane: PaneId) {
        let killed = self.registry.close(pane);
        self.chains.forget_pane(pane);
        if !self.tree.contains(pane) {
            if killed {
                log::warn!("Closed session {} that had no pane", pane);
            }
            return;
        }
        self.detach(pane);
    }

    /// Layout side of a close: drop the leaf and move focus.
    fn detach(&mut self, pane: PaneId) {
        if let Some(leaf) = self.tree.find_leaf(pane) {
            self.tree.remove(leaf);
        }
        self.changed();
        match self.tree.first_pane() {
            Some(first) => self.focus(first),
            None => self.focused = None,
        }
    }

    /// Move `from` to the `zone` edge of `to`. Center and self-drops are ignored.
    pub fn move_pane_to(&mut self, from: PaneId, to: PaneId, zone: DropZone) {
        let Some((direction, source_first)) = zone.placement() else { return };
        if from == to || !self.tree.contains(to) {
            return;
        }
        let Some(from_leaf) = self.tree.find_leaf(from) else { return };
        self.tree.remove(from_leaf);
        // removing `from` may have collapsed `to`'s parent, so look it up again
        let Some(to_leaf) = self.tree.find_leaf(to) else { return };
        self.tree.insert_beside(to_leaf, from, direction, source_first);
        self.changed();
        self.focus(from);
    }

    pub fn swap_panes(&mut self, from: PaneId, to: PaneId) {
        if from == to || !self.tree.swap_panes(from, to) {
            return;
        }
        self.changed();
        self.focus(from);
    }

    /// Drag-and-drop of `from` onto `to`, whose on-screen rectangle is `rect`.
    pub fn drop_pane(&mut self, from: PaneId, to: PaneId, rect: PaneViewport, x: f32, y: f32) {
        match drop_zone(rect, x, y) {
            DropZone::Center => self.swap_panes(from, to),
            zone => self.move_pane_to(from, to, zone),
        }
    }

    pub fn rename_pane(&mut self, pane: PaneId, name: &str) {
        if self.registry.rename(pane, name) {
            self.changed();
        }
    }

    /// Divider drag: `delta` pixels along an axis of `container` pixels,
    /// measured from where the drag started at `start_ratio`.
    pub fn resize_split(&mut self, node: NodeId, start_ratio: f32, delta: f32, container: f32) {
        if self.tree.set_ratio(node, resize_ratio(start_ratio, delta, container)) {
            self.changed();
        }
    }

    pub fn toggle_split_direction(&mut self, node: NodeId) {
        if self.tree.toggle_direction(node) {
            self.changed();
        }
    }

    pub fn set_focus(&mut self, pane: PaneId) {
        if self.tree.contains(pane) {
            self.focus(pane);
        }
    }

    fn focus(&mut self, pane: PaneId) {
        self.focused = Some(pane);
        self.events.push(UiEvent::Focus { pane });
    }

    pub fn write_input(&mut self, pane: PaneId, data: &[u8]) {
        let now = self.clock.now();
        self.registry.write(pane, data, now);
    }

    pub fn resize_pane(&mut self, pane: PaneId, cols: u16, rows: u16) {
        self.registry.resize(pane, cols, rows);
    }

    pub fn resize_all(&mut self, cols: u16, rows: u16) {
        self.registry.resize_all(cols, rows);
    }

    /// Environment added to shells spawned from now on.
    pub fn set_environment(&mut self, env: Vec<(String, String)>) {
        self.env = env;
    }

    pub fn notify_settings(&self) -> NotifySettings {
        self.notify
    }

    pub fn set_notify_settings(&mut self, settings: NotifySettings) {
        self.notify = settings;
        match serde_json::to_value(settings) {
            Ok(value) => self.store.save(NOTIFY_KEY, &value),
            Err(e) => log::warn!("Failed to serialize notification settings: {}", e),
        }
    }

    /// Type `command` into `target` whenever a command in `source` finishes.
    pub fn add_chain_rule(&mut self, source: PaneId, target: PaneId, command: &str, once: bool) -> Option<u32> {
        if source == target || !self.registry.contains(source) || !self.registry.contains(target) {
            return None;
        }
        Some(self.chains.add(source, target, command.to_string(), once))
    }

    pub fn remove_chain_rule(&mut self, id: u32) -> bool {
        self.chains.remove(id)
    }

    pub fn chain_rules(&self) -> &[ChainRule] {
        self.chains.rules()
    }

    /// Drain session events, fire due timers and flush a due layout save.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for event in self.registry.poll(now) {
            match event {
                RegistryEvent::Output { id, data } => {
                    self.events.push(UiEvent::Output { pane: id, data });
                }
                RegistryEvent::Exited { id } => {
                    self.events.push(UiEvent::Exited { pane: id });
                    self.chains.forget_pane(id);
                    if self.tree.contains(id) {
                        self.detach(id);
                    }
                }
                RegistryEvent::Completed { id, completion } => self.completed(id, completion, now),
            }
        }
        if self.save.take_due(now) {
            self.save_now();
        }
    }

    fn completed(&mut self, pane: PaneId, completion: Completion, now: Instant) {
        log::info!(
            "Pane {} finished {:?} after {:?} ({:?})",
            pane,
            completion.label,
            completion.elapsed,
            completion.kind
        );
        for (target, command) in self.chains.fire(pane) {
            if self.registry.contains(target) {
                log::debug!("Chained command for pane {}: {}", target, command);
                self.registry.write(target, format!("{}\r", command).as_bytes(), now);
            }
        }
        if self.notify.should_notify(completion.elapsed) {
            let pane_name = self.registry.name(pane).unwrap_or_default().to_string();
            self.events.push(UiEvent::Notify(Notification {
                pane,
                pane_name,
                label: completion.label,
                elapsed: completion.elapsed,
                kind: completion.kind,
            }));
        }
    }

    /// Structural change: re-render now, save after the quiet window.
    fn changed(&mut self) {
        self.events.push(UiEvent::Render);
        self.save.schedule(self.clock.now());
    }

    fn save_now(&mut self) {
        self.save.cancel();
        let layout = self.serialize_layout();
        self.store.save(LAYOUT_KEY, &LayoutNode::to_value(layout.as_ref()));
    }

    /// Export the layout with each pane's name and live working directory.
    pub fn serialize_layout(&self) -> Option<LayoutNode> {
        fn walk(ws: &Workspace, id: NodeId) -> Option<LayoutNode> {
            match ws.tree.node(id)?.kind {
                NodeKind::Leaf { pane } => Some(LayoutNode::Terminal {
                    name: ws.registry.name(pane).unwrap_or("shell").to_string(),
                    cwd: ws.registry.cwd(pane).map(str::to_string),
                }),
                NodeKind::Split { direction, ratio, children: [a, b] } => Some(LayoutNode::Split {
                    direction,
                    ratio,
                    children: Box::new([walk(ws, a)?, walk(ws, b)?]),
                }),
            }
        }
        walk(self, self.tree.root()?)
    }

    /// Replace the layout with `doc`, spawning a fresh shell per saved pane.
    /// The document is fully checked first; on error nothing changes.
    pub fn restore_layout(&mut self, doc: &Value) -> Result<usize, RestoreError> {
        let layout = LayoutNode::from_value(doc)?;

        let mut tree = SplitTree::new();
        let root = self.build(&mut tree, &layout);
        tree.set_root(root);

        let old = std::mem::replace(&mut self.tree, tree);
        for pane in old.pane_ids() {
            self.registry.close(pane);
            self.chains.forget_pane(pane);
        }
        self.events.push(UiEvent::Render);
        match self.tree.first_pane() {
            Some(first) => self.focus(first),
            None => self.focused = None,
        }
        Ok(layout.leaf_count())
    }

    fn build(&mut self, tree: &mut SplitTree, node: &LayoutNode) -> NodeId {
        match node {
            LayoutNode::Terminal { name, cwd } => {
                let cwd = cwd.as_deref().map(PathBuf::from).filter(|dir| {
                    let exists = dir.is_dir();
                    if !exists {
                        log::warn!("Saved directory {} is gone, using the default", dir.display());
                    }
                    exists
                });
                let id = self.spawn(SessionOptions { name: Some(name.clone()), cwd, ..Default::default() });
                tree.create_leaf(id)
            }
            LayoutNode::Split { direction, ratio, children } => {
                let first = self.build(tree, &children[0]);
                let second = self.build(tree, &children[1]);
                tree.join(*direction, *ratio, first, second)
            }
        }
    }
}
