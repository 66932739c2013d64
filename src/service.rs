pub mod queue;
pub mod session;
pub mod volunteer;
