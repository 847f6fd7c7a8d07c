mod chat;
mod model_list;
mod response;
mod stop_reason;
mod stream;
mod tool;

pub use chat::{ChatRequest, ContentSegment, ImageUrl, JsonSchemaFormat, Message, ResponseFormat, Role};
pub use model_list::{Model, ModelsResponse};
pub use response::{ChatResponse, CompletionContent, CompletionMessage, Metric};
pub use stop_reason::{EventType, StopReason};
pub use stream::{ChatStreamResponse, Delta, FunctionDelta, StreamEvent};
pub use tool::{FunctionCall, FunctionDefinition, Tool, ToolCall, ToolChoice, ToolChoiceFunction};
