pub mod health;
pub mod message;
pub mod session;
pub mod survey;
pub mod topic;
pub mod volunteer;
