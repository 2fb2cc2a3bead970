//! Command lifecycle tracking.
//!
//! Infers when a foreground command starts and finishes from the bytes typed
//! into a session and the bytes it prints. A command starts on a carriage
//! return. It finishes either when the shell prints its cwd marker again
//! (a prompt is showing) or, for full-screen programs that never return to
//! the prompt, after [`IDLE_TIMEOUT`] of output silence.

use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

use crate::terminal::parser::MarkerScanner;

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest label kept for a command, in graphemes, ellipsis included.
pub const LABEL_MAX: usize = 60;

const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

#[derive(Clone, Debug, PartialEq)]
pub enum Lifecycle {
    Idle,
    CommandRunning {
        started: Instant,
        label: Option<String>,
    },
    /// Output arrived without a prompt marker; completes at `deadline` unless
    /// more output or a marker shows up first.
    AwaitingIdleConfirmation {
        started: Instant,
        label: Option<String>,
        deadline: Instant,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    /// The shell printed a new prompt.
    Prompt,
    /// Output went quiet for [`IDLE_TIMEOUT`].
    Idle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub kind: CompletionKind,
    pub elapsed: Duration,
    pub label: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct OutputOutcome {
    /// Directory reported by the prompt marker in this chunk.
    pub cwd: Option<String>,
    pub completion: Option<Completion>,
}

pub struct CommandTracker {
    state: Lifecycle,
    /// Keystrokes typed since the last carriage return.
    line: String,
    scanner: MarkerScanner,
}

impl CommandTracker {
    pub fn new() -> Self {
        CommandTracker {
            state: Lifecycle::Idle,
            line: String::new(),
            scanner: MarkerScanner::new(),
        }
    }

    pub fn state(&self) -> &Lifecycle {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, Lifecycle::Idle)
    }

    /// Pending idle deadline, if the tracker is waiting on output silence.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            Lifecycle::AwaitingIdleConfirmation { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Consume bytes written to the session.
    pub fn on_input(&mut self, data: &[u8], now: Instant) {
        match data {
            [0x7f] | [0x08] => {
                self.line.pop();
                return;
            }
            [0x03] => {
                self.line.clear();
                return;
            }
            _ => {}
        }

        let data = strip_paste_brackets(data);
        let mut segments = data.split(|&b| b == b'\r').peekable();
        while let Some(segment) = segments.next() {
            self.append(segment);
            if segments.peek().is_some() {
                self.start_command(now);
            }
        }
    }

    fn append(&mut self, segment: &[u8]) {
        if segment.is_empty() || segment[0] == 0x1b {
            return;
        }
        let text = String::from_utf8_lossy(segment);
        self.line.extend(text.chars().filter(|c| !c.is_control()));
    }

    fn start_command(&mut self, now: Instant) {
        let label = make_label(&self.line);
        self.line.clear();
        if self.is_running() {
            log::debug!("command restarted before completion, label={:?}", label);
        }
        self.state = Lifecycle::CommandRunning { started: now, label };
    }

    /// Consume one chunk of session output.
    pub fn on_output(&mut self, data: &[u8], now: Instant) -> OutputOutcome {
        let cwd = self.scanner.scan(data);

        // Output read before the running command started cannot describe it.
        if let Lifecycle::CommandRunning { started, .. } | Lifecycle::AwaitingIdleConfirmation { started, .. } =
            self.state
        {
            if now < started {
                return OutputOutcome { cwd, completion: None };
            }
        }

        let state = std::mem::replace(&mut self.state, Lifecycle::Idle);

        if cwd.is_some() {
            let completion = match state {
                Lifecycle::CommandRunning { started, label }
                | Lifecycle::AwaitingIdleConfirmation { started, label, .. } => Some(Completion {
                    kind: CompletionKind::Prompt,
                    elapsed: now.saturating_duration_since(started),
                    label,
                }),
                Lifecycle::Idle => None,
            };
            return OutputOutcome { cwd, completion };
        }

        self.state = match state {
            Lifecycle::CommandRunning { started, label }
            | Lifecycle::AwaitingIdleConfirmation { started, label, .. } => {
                Lifecycle::AwaitingIdleConfirmation { started, label, deadline: now + IDLE_TIMEOUT }
            }
            Lifecycle::Idle => Lifecycle::Idle,
        };
        OutputOutcome::default()
    }

    /// Fire the idle timer if its deadline has passed. Elapsed time is
    /// measured up to the deadline, not to `now`.
    pub fn poll(&mut self, now: Instant) -> Option<Completion> {
        match self.state {
            Lifecycle::AwaitingIdleConfirmation { deadline, .. } if now >= deadline => {}
            _ => return None,
        }
        match std::mem::replace(&mut self.state, Lifecycle::Idle) {
            Lifecycle::AwaitingIdleConfirmation { started, label, deadline } => Some(Completion {
                kind: CompletionKind::Idle,
                elapsed: deadline.saturating_duration_since(started),
                label,
            }),
            _ => unreachable!(),
        }
    }
}

impl Default for CommandTracker {
    fn default() -> Self {
        CommandTracker::new()
    }
}

fn strip_paste_brackets(data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    let contains = |needle: &[u8]| data.windows(needle.len()).any(|w| w == needle);
    if !contains(BRACKETED_PASTE_START) && !contains(BRACKETED_PASTE_END) {
        return std::borrow::Cow::Borrowed(data);
    }
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let rest = &data[i..];
        if rest.starts_with(BRACKETED_PASTE_START) {
            i += BRACKETED_PASTE_START.len();
        } else if rest.starts_with(BRACKETED_PASTE_END) {
            i += BRACKETED_PASTE_END.len();
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    std::borrow::Cow::Owned(out)
}

/// Trim a typed line into a label, ellipsizing past [`LABEL_MAX`] graphemes.
pub fn make_label(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let graphemes: Vec<&str> = trimmed.graphemes(true).collect();
    if graphemes.len() <= LABEL_MAX {
        return Some(trimmed.to_string());
    }
    let mut label: String = graphemes[..LABEL_MAX - 1].concat();
    label.push('…');
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &[u8] = b"\x1b]7;file://host/home/me\x07$ ";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn type_line(tracker: &mut CommandTracker, line: &str, now: Instant) {
        for c in line.chars() {
            tracker.on_input(c.to_string().as_bytes(), now);
        }
        tracker.on_input(b"\r", now);
    }

    fn label_of(tracker: &CommandTracker) -> Option<String> {
        match tracker.state() {
            Lifecycle::CommandRunning { label, .. } | Lifecycle::AwaitingIdleConfirmation { label, .. } => label.clone(),
            Lifecycle::Idle => None,
        }
    }

    #[test]
    fn test_carriage_return_starts_command() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        type_line(&mut tracker, "npm install", t0);
        assert_eq!(
            tracker.state(),
            &Lifecycle::CommandRunning { started: t0, label: Some("npm install".into()) }
        );
    }

    #[test]
    fn test_pasted_line_with_carriage_return() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"cargo build\r", t0);
        assert_eq!(label_of(&tracker).as_deref(), Some("cargo build"));
    }

    #[test]
    fn test_bracketed_paste_is_unwrapped() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"\x1b[200~make test\x1b[201~", t0);
        tracker.on_input(b"\r", t0);
        assert_eq!(label_of(&tracker).as_deref(), Some("make test"));
    }

    #[test]
    fn test_backspace_and_interrupt() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"lss", t0);
        tracker.on_input(&[0x7f], t0);
        tracker.on_input(b" -la", t0);
        tracker.on_input(&[0x08], t0);
        tracker.on_input(b"a\r", t0);
        assert_eq!(label_of(&tracker).as_deref(), Some("ls -la"));

        let mut tracker = CommandTracker::new();
        tracker.on_input(b"rm -rf build", t0);
        tracker.on_input(&[0x03], t0);
        tracker.on_input(b"echo hi\r", t0);
        assert_eq!(label_of(&tracker).as_deref(), Some("echo hi"));
    }

    #[test]
    fn test_escape_sequences_ignored() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"git", t0);
        tracker.on_input(b"\x1b[A", t0);
        tracker.on_input(b" status\r", t0);
        assert_eq!(label_of(&tracker).as_deref(), Some("git status"));
    }

    #[test]
    fn test_empty_line_has_no_label() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"   \r", t0);
        assert_eq!(tracker.state(), &Lifecycle::CommandRunning { started: t0, label: None });
    }

    #[test]
    fn test_label_ellipsized() {
        let long = "x".repeat(100);
        let label = make_label(&long).unwrap();
        assert_eq!(label.graphemes(true).count(), LABEL_MAX);
        assert!(label.ends_with('…'));
        assert_eq!(make_label(&"y".repeat(LABEL_MAX)).unwrap(), "y".repeat(LABEL_MAX));
    }

    #[test]
    fn test_idle_completion_after_silence() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"npm install\r", t0);
        assert_eq!(tracker.on_output(b"npm install\r\n", t0), OutputOutcome::default());

        assert_eq!(tracker.poll(t0 + ms(1999)), None);
        let done = tracker.poll(t0 + ms(2000)).expect("idle completion");
        assert_eq!(done.kind, CompletionKind::Idle);
        assert!(done.elapsed >= ms(2000));
        assert_eq!(done.label.as_deref(), Some("npm install"));
        assert_eq!(tracker.state(), &Lifecycle::Idle);
        assert_eq!(tracker.poll(t0 + ms(5000)), None);
    }

    #[test]
    fn test_output_resets_idle_window() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"npm install\r", t0);
        tracker.on_output(b"npm install\r\n", t0);
        tracker.on_output(b"added 120 packages\r\n", t0 + ms(1000));

        assert_eq!(tracker.poll(t0 + ms(2000)), None);
        assert_eq!(tracker.poll(t0 + ms(2999)), None);
        let done = tracker.poll(t0 + ms(3010)).unwrap();
        assert_eq!(done.elapsed, ms(3000));
    }

    #[test]
    fn test_late_poll_reports_deadline_elapsed() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"vim\r", t0);
        tracker.on_output(b"\x1b[?1049h", t0 + ms(100));
        let done = tracker.poll(t0 + ms(9000)).unwrap();
        assert_eq!(done.elapsed, ms(2100));
    }

    #[test]
    fn test_prompt_completion_cancels_idle_timer() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"npm install\r", t0);
        tracker.on_output(b"npm install\r\n", t0);

        let outcome = tracker.on_output(MARKER, t0 + ms(500));
        assert_eq!(outcome.cwd.as_deref(), Some("/home/me"));
        let done = outcome.completion.expect("prompt completion");
        assert_eq!(done.kind, CompletionKind::Prompt);
        assert_eq!(done.elapsed, ms(500));
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(t0 + ms(10_000)), None);
    }

    #[test]
    fn test_marker_while_idle_only_updates_cwd() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        let outcome = tracker.on_output(MARKER, t0);
        assert_eq!(outcome.cwd.as_deref(), Some("/home/me"));
        assert_eq!(outcome.completion, None);
        assert_eq!(tracker.on_output(b"noise", t0), OutputOutcome::default());
        assert_eq!(tracker.deadline(), None);
    }

    #[test]
    fn test_restart_drops_pending_idle() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        type_line(&mut tracker, "sleep 100", t0);
        tracker.on_output(b"\r\n", t0);
        type_line(&mut tracker, "ls", t0 + ms(1500));
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(t0 + ms(2500)), None);

        let done = tracker.on_output(MARKER, t0 + ms(1600)).completion.unwrap();
        assert_eq!(done.label.as_deref(), Some("ls"));
        assert_eq!(done.elapsed, ms(100));
    }

    #[test]
    fn test_output_read_before_start_is_not_a_completion() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_input(b"cargo build --release\r", t0 + ms(5));

        let outcome = tracker.on_output(MARKER, t0);
        assert_eq!(outcome.cwd.as_deref(), Some("/home/me"));
        assert_eq!(outcome.completion, None);
        assert!(tracker.is_running());
        assert_eq!(tracker.on_output(b"old prompt text", t0 + ms(1)), OutputOutcome::default());
        assert_eq!(tracker.deadline(), None);

        let done = tracker.on_output(MARKER, t0 + ms(905)).completion.unwrap();
        assert_eq!(done.kind, CompletionKind::Prompt);
        assert_eq!(done.elapsed, ms(900));
        assert_eq!(done.label.as_deref(), Some("cargo build --release"));
    }

    #[test]
    fn test_no_timer_without_command() {
        let t0 = Instant::now();
        let mut tracker = CommandTracker::new();
        tracker.on_output(b"motd banner\r\n", t0);
        assert_eq!(tracker.poll(t0 + ms(60_000)), None);
    }
}
