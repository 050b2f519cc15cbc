pub mod config;
pub mod executor;
pub mod handlers;
pub mod orchestration;
pub mod queue;
pub mod runtime;
pub mod shared;
