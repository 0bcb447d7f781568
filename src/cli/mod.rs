mod args;
mod authenticator;
mod terminal;

pub use args::{Cli, Commands, GlobalArgs};
pub use authenticator::SessionAuthenticator;
pub use terminal::{confirm, read_line, TerminalPrompt};
