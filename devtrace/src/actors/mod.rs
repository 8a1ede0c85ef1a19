//! Actor modules
//!
//! One coordinator per process; one frame agent per frame; one trace
//! aggregator per host frame while its network monitor is on.

pub mod coordinator;
pub mod frame_agent;
pub mod tabs;
pub mod tool_register;
pub mod trace_aggregator;

pub use coordinator::{
    CoordinatorActor, CoordinatorArguments, CoordinatorError, CoordinatorMsg,
};
pub use frame_agent::{FrameAgentActor, FrameAgentArguments, FrameAgentMsg, FrameRole, FrameStatus};
pub use tabs::{NavigationPhase, TabRegistry, TabSummary};
pub use tool_register::{NoopToolHooks, ToolHooks, ToolRegister, Transition};
pub use trace_aggregator::{
    ReplayOutput, TraceAggregatorActor, TraceAggregatorArguments, TraceAggregatorMsg,
};
