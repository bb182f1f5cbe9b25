//! Terminal views: picking a device, watching the network, and looking at a
//! figure when no file was asked for.

mod chart_view;
mod device_selector;
mod error;
mod topology_view;

pub use chart_view::chart_view;
pub use device_selector::device_selector;
pub use error::GuiError;
pub use topology_view::{topology_view, EdgeStyle, LOCATED_COLOR, UNLOCATED_COLOR};

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};

type Term = Terminal<CrosstermBackend<Stdout>>;

fn enter_terminal() -> Result<Term, GuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn leave_terminal(terminal: &mut Term) -> Result<(), GuiError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// Run `app` in the alternate screen, putting the terminal back however it
// ends.
fn with_terminal<T>(app: impl FnOnce(&mut Term) -> Result<T, GuiError>) -> Result<T, GuiError> {
    let mut terminal = enter_terminal()?;
    let res = app(&mut terminal);
    leave_terminal(&mut terminal)?;
    res
}
