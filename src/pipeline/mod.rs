pub mod dedup;
pub mod extraction;
pub mod queue;
pub mod retry;
pub mod rotation;
