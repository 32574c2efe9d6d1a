// agent/mod.rs — rule-based chat agent.
//
// One turn = resolve the message to an intent, dispatch it against the task
// store, return a reply plus a structured record of the call.  No state is
// kept between turns.

pub mod dispatch;
pub mod intent;

pub use dispatch::{dispatch, run, ChatOutcome, ToolCall};
pub use intent::{resolve, Intent};
