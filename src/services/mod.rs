pub mod pid_scanner;
pub mod proc_fs;
pub mod process_info;
pub mod process_matcher;

pub use pid_scanner::PidScanner;
pub use proc_fs::ProcFs;
pub use process_info::ProcessInfo;
pub use process_matcher::ProcessMatcher;
