pub mod console;
pub mod quickstart;

pub use quickstart::QuickstartCommand;
