//! Build stages and the pipeline that walks them.

mod runner;
mod stage;

pub use runner::{BuildPipeline, BuildReport, ResolvedBuild};
pub use stage::{BuildStage, PipelineFailure};
