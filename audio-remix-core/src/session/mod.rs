pub mod handle;
pub mod lease;
pub mod scheduler;
pub mod signal;
pub mod timer;
