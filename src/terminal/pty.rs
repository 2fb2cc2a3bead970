use rustix::termios::{self, Winsize};
use rustix_openpty::openpty;
use std::io::Read;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use super::shell::display_name;
use super::{Process, SessionEvent, SpawnRequest, Spawner};
use crate::pane::PaneId;

/// Spawns the configured shell on a fresh pseudo-terminal.
pub struct PtySpawner {
    program: String,
}

impl PtySpawner {
    pub fn new(program: String) -> Self {
        PtySpawner { program }
    }
}

impl Spawner for PtySpawner {
    fn program(&self) -> &str {
        &self.program
    }

    fn spawn(
        &self,
        id: PaneId,
        request: &SpawnRequest,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn Process>, Box<dyn std::error::Error>> {
        let pty = Pty::spawn(&self.program, id, request, events)?;
        Ok(Box::new(pty))
    }
}

pub struct Pty {
    master_fd: OwnedFd,
    child: Child,
}

impl Pty {
    pub fn spawn(
        program: &str,
        id: PaneId,
        request: &SpawnRequest,
        events: Sender<SessionEvent>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let pty_pair = openpty(None, None)?;

        let master_fd = pty_pair.controller;
        let slave_fd = pty_pair.user;

        // Set initial window size
        let winsize = Winsize {
            ws_row: request.rows,
            ws_col: request.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let _ = termios::tcsetwinsize(master_fd.as_fd(), winsize);

        let mut cmd = Command::new(program);
        // Leading '-' asks the shell to behave as a login shell.
        cmd.arg0(format!("-{}", display_name(program)))
            .current_dir(&request.cwd)
            .env("TERM", "xterm-256color")
            .stdin(Stdio::from(slave_fd.try_clone()?))
            .stdout(Stdio::from(slave_fd.try_clone()?))
            .stderr(Stdio::from(slave_fd));
        for key in &request.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        // New session with the pty as controlling terminal. Runs between fork
        // and exec, so only async-signal-safe calls.
        let make_session_leader = || -> std::io::Result<()> {
            if unsafe { libc::setsid() } < 0 {
                return Err(std::io::Error::last_os_error());
            }
            if unsafe { libc::ioctl(0, libc::TIOCSCTTY as _, 0) } < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        };
        unsafe {
            cmd.pre_exec(make_session_leader);
        }

        let child = cmd.spawn()?;
        log::info!("Spawned {} (pid {}) for pane {} in {}", program, child.id(), id, request.cwd.display());

        let mut reader = std::fs::File::from(master_fd.try_clone()?);
        std::thread::Builder::new()
            .name(format!("pty-reader-{id}"))
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let event = SessionEvent::Output {
                                id,
                                data: buf[..n].to_vec(),
                                at: Instant::now(),
                            };
                            if events.send(event).is_err() {
                                // Registry is gone; nobody will read further output.
                                return;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
                let _ = events.send(SessionEvent::Exited { id });
                log::info!("PTY reader thread for pane {} exiting", id);
            })?;

        Ok(Pty { master_fd, child })
    }
}

impl Process for Pty {
    fn write(&self, mut data: &[u8]) {
        while !data.is_empty() {
            match rustix::io::write(&self.master_fd, data) {
                Ok(0) => break,
                Ok(n) => data = &data[n..],
                Err(rustix::io::Errno::INTR) => continue,
                Err(e) => {
                    log::debug!("PTY write to pid {} failed: {}", self.child.id(), e);
                    break;
                }
            }
        }
    }

    fn resize(&self, cols: u16, rows: u16) {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // Fails harmlessly once the child is gone.
        let _ = termios::tcsetwinsize(self.master_fd.as_fd(), winsize);
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGWINCH);
        }
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        let pid = self.child.id();
        unsafe {
            libc::kill(pid as i32, libc::SIGHUP);
        }
        // Give the shell a moment to exit on SIGHUP, then force it.
        let give_up = Instant::now() + Duration::from_millis(50);
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) | Err(_) => break,
                Ok(None) if Instant::now() >= give_up => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        log::info!("PTY child {} cleaned up", pid);
    }
}
