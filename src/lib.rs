pub mod app;
pub mod shutdown;

pub use app::{load_config, Application, Overrides};
pub use shutdown::ShutdownManager;
