//! Terminal input as an event source.
//!
//! Wraps `crossterm`'s async `EventStream` and translates key and resize
//! events into the pager's normalized event model. Release events are
//! dropped; repeats pass through unchanged.

use core_events::{AsyncEventSource, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::event::{
    Event as CEvent, EventStream, KeyCode as CKeyCode, KeyEventKind, KeyModifiers as CModifiers,
};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

pub struct TerminalInput {
    pub cancel: CancellationToken,
}

impl AsyncEventSource for TerminalInput {
    fn name(&self) -> &'static str {
        "terminal-input"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = EventStream::new();
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    maybe = stream.next() => match maybe {
                        Some(Ok(ev)) => {
                            if let Some(ev) = translate(ev) {
                                if tx.send(ev).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(target: "input", error = %e, "event stream error");
                            return;
                        }
                        None => return,
                    }
                }
            }
        })
    }
}

fn translate(ev: CEvent) -> Option<Event> {
    match ev {
        CEvent::Key(key) if key.kind != KeyEventKind::Release => {
            let code = match key.code {
                CKeyCode::Char(c) => KeyCode::Char(c),
                CKeyCode::Enter => KeyCode::Enter,
                CKeyCode::Esc => KeyCode::Esc,
                CKeyCode::Backspace => KeyCode::Backspace,
                CKeyCode::Tab => KeyCode::Tab,
                CKeyCode::Up => KeyCode::Up,
                CKeyCode::Down => KeyCode::Down,
                CKeyCode::Left => KeyCode::Left,
                CKeyCode::Right => KeyCode::Right,
                CKeyCode::Home => KeyCode::Home,
                CKeyCode::End => KeyCode::End,
                CKeyCode::PageUp => KeyCode::PageUp,
                CKeyCode::PageDown => KeyCode::PageDown,
                CKeyCode::Delete => KeyCode::Delete,
                _ => return None,
            };
            let mut mods = KeyModifiers::empty();
            if key.modifiers.contains(CModifiers::CONTROL) {
                mods |= KeyModifiers::CTRL;
            }
            if key.modifiers.contains(CModifiers::ALT) {
                mods |= KeyModifiers::ALT;
            }
            if key.modifiers.contains(CModifiers::SHIFT) {
                mods |= KeyModifiers::SHIFT;
            }
            Some(Event::Key(KeyEvent { code, mods }))
        }
        CEvent::Resize(w, h) => Some(Event::Resize(w, h)),
        _ => None,
    }
}
