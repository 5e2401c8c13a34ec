//! Script-to-video rendering pipeline.
//!
//! Sequential stages: script parsing, timeline building, asset resolution,
//! per-scene rendering (parallel within the stage), stream-copy concat and
//! the final BGM mix. Each stage is its own module; the binary in `main.rs`
//! only wires configuration and logging around [`pipeline::RenderPipeline`].

pub mod assets;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod scene_renderer;
pub mod script;
pub mod timeline;

pub use assets::AssetResolver;
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{PipelineOutput, RenderPipeline};
pub use script::{parse_script, ScriptDocument, ScriptSection};
pub use timeline::{SceneDraft, TimelineBuilder};
