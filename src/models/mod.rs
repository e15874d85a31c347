pub mod process;
pub mod stats;

pub use process::{Liveness, Pid, ProcessSnapshot};
pub use stats::{MemoryField, MemoryStats};
