//! Keyboard commands read from the terminal.
//!
//! Keys are read one at a time from a raw-mode terminal, so Alt+S arrives as a real chord rather
//! than as an escape sequence buried in a line of input.

use crossterm::event::Event;
use crossterm::event::EventStream;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

/// A command entered by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a sync for one device, or all devices when `None`
    Sync(Option<String>),
    Quit,
}

/// Map one key press to a command. Releases, repeats and unbound keys yield `None`.
pub fn command_for_key(key: &KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('s' | 'S') if key.modifiers.contains(KeyModifiers::ALT) => {
            Some(Command::Sync(None))
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char('q') if key.modifiers.is_empty() => Some(Command::Quit),
        _ => None,
    }
}

/// Read terminal key events and forward the commands they map to.
///
/// Stops when the terminal input ends or the receiver is dropped.
pub fn spawn_key_reader(tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Key(key)) => {
                    let Some(command) = command_for_key(&key) else {
                        continue;
                    };
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read terminal input: {}", e);
                    break;
                }
            }
        }
        debug!("Key reader stopped");
    })
}
