use std::{error::Error, fmt::Display, sync::PoisonError};

#[derive(Debug)]
pub enum GuiError {
    IOError(std::io::Error),
    /// The reader thread panicked while holding the shared session
    Poisoned,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IOError(e) => write!(f, "terminal error: {}", e),
            GuiError::Poisoned => write!(f, "shared state poisoned by a panicked thread"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl<T> From<PoisonError<T>> for GuiError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
