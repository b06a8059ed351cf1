pub mod cli;
pub mod session;
pub mod shell;

pub use session::{ChatSession, Conversation, TurnReport};
