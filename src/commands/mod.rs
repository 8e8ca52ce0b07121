mod discover;
mod exec;
mod list;

pub use discover::discover_command;
pub use exec::exec_command;
pub use list::list_command;
