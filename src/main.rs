use hive::config::{self, Config};
use hive::store::JsonFileStore;
use hive::terminal::pty::PtySpawner;
use hive::terminal::shell;
use hive::workspace::{SystemClock, UiEvent, Workspace};
use rustix::termios::{self, OptionalActions, Termios};
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

fn main() {
    let config = Config::load();
    init_logging(&config);

    let program = config.shell.program.clone().unwrap_or_else(shell::default_program);
    log::info!("hive starting with {}", program);

    let mut workspace = Workspace::new(
        &config,
        Box::new(PtySpawner::new(program)),
        Box::new(JsonFileStore::new(config::data_dir())),
        Box::new(SystemClock),
    );
    if let Ok(size) = termios::tcgetwinsize(std::io::stdout()) {
        if size.ws_col > 0 && size.ws_row > 0 {
            workspace.resize_all(size.ws_col, size.ws_row);
        }
    }
    workspace.startup();

    let raw = RawMode::enter();
    let input = spawn_stdin_reader();
    let frame = config.tick_interval();
    let mut stdout = std::io::stdout().lock();

    while !workspace.is_empty() {
        let started = Instant::now();

        while let Ok(data) = input.try_recv() {
            if let Some(pane) = workspace.focused() {
                workspace.write_input(pane, &data);
            }
        }

        workspace.tick();
        for event in workspace.drain_events() {
            match event {
                UiEvent::Output { pane, data } if workspace.focused() == Some(pane) => {
                    let _ = stdout.write_all(&data);
                }
                UiEvent::Notify(n) => log::info!("{}: {}", n.title(), n.body()),
                UiEvent::Exited { pane } => log::info!("Pane {} exited", pane),
                _ => {}
            }
        }
        let _ = stdout.flush();

        if let Some(rest) = frame.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    drop(raw);
    workspace.shutdown();
    log::info!("hive exiting");
}

fn init_logging(config: &Config) {
    use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

    let level = config.log_level();
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    // stderr shares the screen with the focused pane, so only warnings go there
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level.min(log::LevelFilter::Warn),
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let dir = config::data_dir();
    match std::fs::create_dir_all(&dir).and_then(|_| std::fs::File::create(dir.join("hive.log"))) {
        Ok(file) => loggers.push(WriteLogger::new(level, log_config, file)),
        Err(e) => eprintln!("hive: cannot open log file in {}: {}", dir.display(), e),
    }
    let _ = CombinedLogger::init(loggers);
}

/// Keystrokes pass straight through to the focused shell while this is alive.
struct RawMode {
    saved: Termios,
}

impl RawMode {
    fn enter() -> Option<Self> {
        let stdin = std::io::stdin();
        if !termios::isatty(&stdin) {
            return None;
        }
        let saved = termios::tcgetattr(&stdin).ok()?;
        let mut raw = saved.clone();
        raw.make_raw();
        if let Err(e) = termios::tcsetattr(&stdin, OptionalActions::Now, &raw) {
            log::warn!("Failed to enter raw mode: {}", e);
            return None;
        }
        Some(RawMode { saved })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(std::io::stdin(), OptionalActions::Now, &self.saved);
    }
}

fn spawn_stdin_reader() -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 4096];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to start stdin reader: {}", e);
    }
    rx
}
