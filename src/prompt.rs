use std::io::{self, IsTerminal};

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Block until the operator presses a key. Returns immediately when stdin is
/// not a terminal.
pub fn wait_for_keypress() -> Result<()> {
    if !io::stdin().is_terminal() {
        return Ok(());
    }

    enable_raw_mode()?;
    let result = loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    disable_raw_mode()?;

    Ok(result?)
}
