mod environment;
mod settings;

pub use environment::BuildEnvironment;
pub use settings::{resolve_data_dir, BuildSettings, DATA_DIR_ENV};
