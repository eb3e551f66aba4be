pub mod board;
pub mod column;
pub mod ids;
pub mod position;
pub mod task;
