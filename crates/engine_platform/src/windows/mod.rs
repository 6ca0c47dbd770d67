//! Windows-only capture collaborators.

mod process_loopback;

pub use process_loopback::ProcessLoopbackClient;
