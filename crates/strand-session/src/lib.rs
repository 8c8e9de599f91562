pub mod log;
pub mod reducer;
pub mod tool_usage;
pub mod usage;

pub use log::{AskType, EventKind, LogEvent, SayType};
pub use reducer::{
    reduce, ConversationLogReducer, LogPayloadError, ReduceOutcome, ReducedLog, TaskOrigin,
    TimelineItem,
};
pub use tool_usage::{ToolUsage, ToolUsageStats};
pub use usage::{ApiRequestInfo, CondensePayload, ContextCondense, UsageSnapshot};
