//! Short-clip pipeline: stage machine and the orchestrator that drives it

pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    BlobKeys, Orchestrator, PipelineConfig, PipelineRequest, PipelineResult, StageFailure,
};
pub use state::PipelineStage;
