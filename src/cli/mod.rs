pub mod cli;
pub mod watch_file;

pub use cli::CommandArgs;
pub use watch_file::WatchFile;
