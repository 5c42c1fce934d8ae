//! Kubelet socket presence watcher.
//!
//! `notify` delivers raw filesystem events on its own thread; they are bridged
//! into a tokio task that filters them down to the one watched path and turns
//! them into [`WatchEvent::Appeared`] / [`WatchEvent::Disappeared`].

use std::fmt;
use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PluginError, Result};

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Appeared,
    Disappeared,
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::Appeared => write!(f, "appeared"),
            WatchEvent::Disappeared => write!(f, "disappeared"),
        }
    }
}

/// Watches one socket path and reports its creation and removal.
///
/// Only the parent directory is watched. Directory entries change on unlink
/// even while a listener keeps the socket inode alive, and one watch means
/// each change arrives exactly once.
pub struct SocketWatcher {
    target: PathBuf,
    events: mpsc::Receiver<WatchEvent>,
    errors: mpsc::Receiver<notify::Error>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SocketWatcher {
    /// Arm a watch on the parent of `target` under a child of `cancel`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` has no parent directory or the
    /// notification backend cannot be initialized or armed.
    pub fn start(target: impl Into<PathBuf>, cancel: &CancellationToken) -> Result<Self> {
        let target = target.into();
        let (parent, name) = match (target.parent(), target.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                (parent.to_path_buf(), name.to_os_string())
            }
            _ => {
                return Err(PluginError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no parent directory", target.display()),
                )));
            }
        };
        // Backends report resolved paths; match events against the same form
        let parent = std::fs::canonicalize(&parent).unwrap_or(parent);
        let target = parent.join(name);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })?;

        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        let present = target.exists();
        debug!(
            "Watching {} ({})",
            target.display(),
            if present { "present" } else { "absent" }
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, error_rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = cancel.child_token();

        let translator = Translator {
            _watcher: watcher,
            target: target.clone(),
            parent,
            present,
            events: event_tx,
            errors: error_tx,
        };
        let task = tokio::spawn(translator.run(raw_rx, cancel.clone()));

        Ok(Self {
            target,
            events: event_rx,
            errors: error_rx,
            cancel,
            task: Some(task),
        })
    }

    /// Next semantic event; `None` once the watcher is closed.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Event and error streams, borrowed together for use in one `select!`.
    pub fn streams(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<WatchEvent>,
        &mut mpsc::Receiver<notify::Error>,
    ) {
        (&mut self.events, &mut self.errors)
    }

    /// Wait until `wanted` is observed, logging backend errors on the way.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::WatcherClosed` if the event stream ends first.
    pub async fn wait_for(&mut self, wanted: WatchEvent) -> Result<()> {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) if event == wanted => return Ok(()),
                    Some(event) => debug!("Ignoring {event} while waiting for {wanted}"),
                    None => return Err(PluginError::WatcherClosed),
                },
                Some(err) = self.errors.recv() => {
                    warn!("Watcher error on {}: {err}", self.target.display());
                }
            }
        }
    }

    /// Release the underlying watch. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            // Translation task owns the notify handle; stopping it drops the watch
            task.abort();
            debug!("Closed watcher on {}", self.target.display());
        }
    }
}

impl Drop for SocketWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the notify handle and tracks whether the target currently exists
struct Translator {
    // Dropping it releases the watch
    _watcher: RecommendedWatcher,
    target: PathBuf,
    parent: PathBuf,
    present: bool,
    events: mpsc::Sender<WatchEvent>,
    errors: mpsc::Sender<notify::Error>,
}

impl Translator {
    async fn run(
        mut self,
        mut raw: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
        cancel: CancellationToken,
    ) {
        loop {
            let res = tokio::select! {
                () = cancel.cancelled() => break,
                res = raw.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };

            let emitted = match res {
                Ok(event) => self.translate(&event),
                Err(err) => {
                    if self.errors.try_send(err).is_err() {
                        warn!("Dropping watcher error for {}", self.target.display());
                    }
                    continue;
                }
            };

            for event in emitted {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = self.events.send(event) => if sent.is_err() { return },
                }
            }
        }
        debug!("Watcher translation loop for {} exited", self.target.display());
    }

    fn translate(&mut self, event: &notify::Event) -> Vec<WatchEvent> {
        if event.paths.iter().any(|p| *p == self.parent) {
            return self.translate_parent(event);
        }
        if !event.paths.iter().any(|p| *p == self.target) {
            return Vec::new();
        }

        let appeared = match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => true,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
            EventKind::Modify(ModifyKind::Name(_)) => self.target.exists(),
            _ => return Vec::new(),
        };

        let mut out = Vec::new();
        if appeared {
            self.on_appeared(&mut out);
        } else {
            self.on_disappeared(&mut out);
        }
        out
    }

    /// The parent directory itself went away, taking the target with it
    fn translate_parent(&mut self, event: &notify::Event) -> Vec<WatchEvent> {
        if !matches!(event.kind, EventKind::Remove(_)) {
            return Vec::new();
        }
        if self
            .errors
            .try_send(notify::Error::path_not_found().add_path(self.parent.clone()))
            .is_err()
        {
            warn!("Dropping watcher error for {}", self.parent.display());
        }
        let mut out = Vec::new();
        self.on_disappeared(&mut out);
        out
    }

    fn on_appeared(&mut self, out: &mut Vec<WatchEvent>) {
        if self.present {
            return;
        }
        self.present = true;
        info!("Socket {} appeared", self.target.display());
        out.push(WatchEvent::Appeared);
    }

    fn on_disappeared(&mut self, out: &mut Vec<WatchEvent>) {
        if !self.present {
            return;
        }
        self.present = false;
        info!("Socket {} disappeared", self.target.display());
        out.push(WatchEvent::Disappeared);
    }
}
