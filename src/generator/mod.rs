pub mod context;
pub mod conversation;
pub mod outlet;
pub mod research;
pub mod workflow;
