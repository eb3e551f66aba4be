pub mod model_loaders;

pub use model_loaders::{load_board_middleware, load_column_middleware, load_task_middleware};
