//! wgpu rendering of the card batch

pub mod context;
pub mod viewer_buffer;
pub mod card_pipeline;

pub use context::{DEPTH_FORMAT, GpuContext};
pub use viewer_buffer::{ViewerBuffer, ViewerUniform};
pub use card_pipeline::{CardBatchGpu, CardPipeline, vertex_layouts};
