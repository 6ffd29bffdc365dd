// Operator control
// Live filter nudges, filtering toggle, baseline snapshot, event tags and quit

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Stands in for `,` inside event tags
pub const TAG_COMMA: &str = ";";

/// A discrete operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    DecreaseCutoff,
    IncreaseCutoff,
    DecreaseBeta,
    IncreaseBeta,
    ToggleFiltering,
    SnapshotBaseline,
    SetEventTag(String),
    ClearEventTag,
    Quit,
}

impl ControlCommand {
    /// Map a single key press
    pub fn from_key(key: char) -> Self {
        match key {
            ',' => ControlCommand::DecreaseCutoff,
            '.' => ControlCommand::IncreaseCutoff,
            '[' => ControlCommand::DecreaseBeta,
            ']' => ControlCommand::IncreaseBeta,
            '/' => ControlCommand::ToggleFiltering,
            '-' => ControlCommand::SnapshotBaseline,
            '\u{1b}' => ControlCommand::Quit,
            other => ControlCommand::SetEventTag(other.to_string()),
        }
    }

    /// Map one line typed on stdin.
    /// An empty line clears the tag; unknown text becomes the tag, with
    /// commas replaced so it stays a single record column.
    pub fn parse_line(line: &str) -> Self {
        let text = line.trim_end_matches(['\r', '\n']);
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (None, _) => ControlCommand::ClearEventTag,
            (Some(key), None) if key != 'q' => ControlCommand::from_key(key),
            _ if text == "q" || text == "quit" => ControlCommand::Quit,
            _ => ControlCommand::SetEventTag(text.trim().replace(',', TAG_COMMA)),
        }
    }
}

/// Shared session run flag
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of the control channel, held by input collaborators
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: UnboundedSender<ControlCommand>,
    run: RunFlag,
}

impl ControlHandle {
    /// Queue a command. `Quit` also clears the run flag immediately so a
    /// loop blocked between samples exits without waiting for data.
    pub fn send(&self, command: ControlCommand) -> bool {
        if command == ControlCommand::Quit {
            self.run.stop();
        }
        self.tx.send(command).is_ok()
    }

    pub fn quit(&self) {
        self.send(ControlCommand::Quit);
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run
    }
}

/// Receiving side, drained by the ingestion loop between samples
pub struct ControlReceiver {
    rx: UnboundedReceiver<ControlCommand>,
}

impl ControlReceiver {
    /// All commands queued since the last call, in arrival order
    pub fn drain(&mut self) -> Vec<ControlCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

/// Create a control channel bound to `run`
pub fn control_channel(run: RunFlag) -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlHandle { tx, run }, ControlReceiver { rx })
}

/// Read operator commands from stdin on a dedicated thread.
/// The thread is detached; it ends on EOF or after a quit command.
pub fn spawn_stdin_reader(handle: ControlHandle) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("stdin control read failed: {}", e);
                    break;
                }
            };

            let command = ControlCommand::parse_line(&line);
            log::debug!("Operator command {:?}", command);
            let quit = command == ControlCommand::Quit;
            if !handle.send(command) || quit {
                break;
            }
        }
    })
}
