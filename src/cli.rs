use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "llama")]
#[command(version, about = "A utility for interacting with the Llama API", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    #[arg(short = 'k', long = "key", global = true, help = "Your API key")]
    pub key: Option<String>,

    #[arg(short = 'm', long = "model", global = true, help = "Model to use")]
    pub model: Option<String>,

    #[arg(
        long = "api-endpoint",
        global = true,
        help = "Custom API base URL (e.g., https://api.llama.com/v1)"
    )]
    pub api_endpoint: Option<String>,

    #[arg(short = 'v', long = "verbose", global = true, help = "Print request details and debug logs")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Returns available models.
    Models,

    /// Completes a chat request.
    Chat(ChatArgs),

    /// Completes a chat streaming request.
    #[command(name = "chat-stream")]
    ChatStream(ChatArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long = "prompt", help = "Chat prompt")]
    pub prompt: String,

    #[arg(long = "system", help = "System prompt placed before the user message")]
    pub system: Option<String>,

    #[arg(long = "image", help = "Image URL to attach to the prompt (repeatable)")]
    pub images: Vec<String>,

    #[arg(long = "temperature")]
    pub temperature: Option<f64>,

    #[arg(long = "top-p")]
    pub top_p: Option<f64>,

    #[arg(long = "top-k")]
    pub top_k: Option<u32>,

    #[arg(long = "repetition-penalty")]
    pub repetition_penalty: Option<f64>,

    #[arg(long = "max-tokens", help = "Maximum completion tokens")]
    pub max_tokens: Option<u32>,

    #[arg(long = "tools", help = "YAML or JSON file with tool definitions")]
    pub tools: Option<PathBuf>,

    #[arg(long = "tool-choice", help = "Force the model to call this tool")]
    pub tool_choice: Option<String>,

    #[arg(
        long = "response-schema",
        help = "JSON Schema file constraining the response format"
    )]
    pub response_schema: Option<PathBuf>,
}
