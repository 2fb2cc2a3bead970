use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::pane::SplitDirection;

/// Store key of the saved pane layout.
pub const LAYOUT_KEY: &str = "layout-state";

/// Persisted layout: pane placement plus each pane's name and directory.
/// Process state is never saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutNode {
    Terminal {
        name: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    Split {
        direction: SplitDirection,
        ratio: f32,
        children: Box<[LayoutNode; 2]>,
    },
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no saved layout")]
    Empty,
    #[error("malformed layout document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("split ratio {0} is not a finite number")]
    BadRatio(f32),
}

impl LayoutNode {
    /// Parse and check a stored document before anything is spawned from it.
    pub fn from_value(doc: &Value) -> Result<LayoutNode, RestoreError> {
        if doc.is_null() {
            return Err(RestoreError::Empty);
        }
        let node: LayoutNode = serde_json::from_value(doc.clone())?;
        node.check()?;
        Ok(node)
    }

    fn check(&self) -> Result<(), RestoreError> {
        match self {
            LayoutNode::Terminal { .. } => Ok(()),
            LayoutNode::Split { ratio, children, .. } => {
                if !ratio.is_finite() {
                    return Err(RestoreError::BadRatio(*ratio));
                }
                children[0].check()?;
                children[1].check()
            }
        }
    }

    pub fn to_value(node: Option<&LayoutNode>) -> Value {
        match node {
            Some(node) => serde_json::to_value(node).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            LayoutNode::Terminal { .. } => 1,
            LayoutNode::Split { children, .. } => children[0].leaf_count() + children[1].leaf_count(),
        }
    }
}

/// Schedule-or-replace debounce for layout saves: every `schedule` pushes the
/// single pending deadline out to `now + window`.
pub struct SaveDebouncer {
    window: Duration,
    pending: Option<Instant>,
}

impl SaveDebouncer {
    pub fn new(window: Duration) -> Self {
        SaveDebouncer { window, pending: None }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.pending = Some(now + self.window);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// True once per burst, when the quiet window has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(due) if now >= due => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
