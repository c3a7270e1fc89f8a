pub mod endpoint;
pub mod session_observer;
