mod precompiled;
pub mod report;
mod samples;
mod scene;

pub use precompiled::PrecompiledDistances;
pub use samples::{InverseCdf, RssiPool};
pub use scene::{AgentTemplate, RoundFrame, SceneFile};
