pub mod output;

pub use output::{display_models, display_response, display_tool_call_violations, StreamPrinter};
