pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod replanner;

pub use executor::{StepContext, StepExecutor, StepOutput, ToolExecutor};
pub use orchestrator::Orchestrator;
pub use planner::{LlmPlanner, Planner};
pub use progress::{ChannelSink, NoopSink, ProgressEvent, ProgressSink};
pub use replanner::{LlmReplanner, ReplanContext, Replanner};
