// Repository layer for database operations

pub mod task;

pub use task::{TaskRegistry, TaskRepository};
