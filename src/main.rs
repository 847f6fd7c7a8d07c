use clap::Parser;
use colored::*;
use futures::StreamExt;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

use llama_cli::api::Client;
use llama_cli::cli::{Args, ChatArgs, Command};
use llama_cli::config::Config;
use llama_cli::error::{LlamaError, Result};
use llama_cli::models::{ChatRequest, ContentSegment, Message, Role, Tool, ToolCall, ToolChoice};
use llama_cli::tools::{load_response_format, load_tool_definitions, validate_tool_call};
use llama_cli::ui::{display_models, display_response, display_tool_call_violations, StreamPrinter};

const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_env_and_args(&args.global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            process::exit(1);
        }
    };

    init_logging(config.verbose);

    let code = match run(args.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            1
        }
    };
    process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "llama_cli=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(command: Command, config: &Config) -> Result<i32> {
    let client = Client::new(&config.client_config())?;

    if config.verbose {
        eprintln!(
            "{}",
            format!("[llama] Endpoint: {}", config.api_endpoint).dimmed()
        );
    }

    match command {
        Command::Models => {
            let models = client.models().await?;
            display_models(&mut io::stdout(), &models.data, config.verbose)?;
            Ok(0)
        }
        Command::Chat(chat_args) => {
            let (request, tools) = build_request(&chat_args, config)?;
            let response = client.chat_completion(request).await?;
            display_response(&mut io::stdout(), &response)?;

            if let Some(calls) = &response.completion_message.tool_calls {
                report_tool_calls(&tools, calls);
            }
            Ok(0)
        }
        Command::ChatStream(chat_args) => run_chat_stream(&client, &chat_args, config).await,
    }
}

async fn run_chat_stream(client: &Client, chat_args: &ChatArgs, config: &Config) -> Result<i32> {
    let (request, tools) = build_request(chat_args, config)?;
    let mut stream = client.chat_completion_stream(request).await?;

    let cancel = stream.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut printer = StreamPrinter::stdout();

    while let Some(update) = stream.next().await {
        match update {
            Ok(update) => printer.print_update(&update)?,
            Err(e) if e.is_aborted() => {
                printer.finish(&stream.last_snapshot().unwrap_or_default())?;
                eprintln!("{}", "Interrupted.".yellow());
                return Ok(EXIT_INTERRUPTED);
            }
            Err(e) => {
                println!();
                return Err(e);
            }
        }
    }

    let last = stream.last_snapshot().unwrap_or_default();
    printer.finish(&last)?;
    report_tool_calls(&tools, &last.tool_calls);

    if config.verbose && !last.is_terminal() {
        eprintln!(
            "{}",
            "[llama] Stream ended without a stop reason".dimmed()
        );
    }
    Ok(0)
}

fn build_request(chat_args: &ChatArgs, config: &Config) -> Result<(ChatRequest, Vec<Tool>)> {
    let model = config.require_model()?;

    let mut messages = Vec::new();
    if let Some(system) = chat_args.system.as_ref().or(config.system_prompt.as_ref()) {
        messages.push(Message::system(system.clone()));
    }

    let mut content = vec![ContentSegment::text(chat_args.prompt.clone())];
    content.extend(chat_args.images.iter().map(ContentSegment::image));
    messages.push(Message::new(Role::User, content));

    let mut request = ChatRequest::new(model, messages);
    request.temperature = chat_args.temperature;
    request.top_p = chat_args.top_p;
    request.top_k = chat_args.top_k;
    request.repetition_penalty = chat_args.repetition_penalty;
    request.max_completion_tokens = chat_args.max_tokens;

    let tools = match &chat_args.tools {
        Some(path) => load_tool_definitions(path)?,
        None => Vec::new(),
    };
    if !tools.is_empty() {
        request = request.with_tools(tools.clone());
    }

    if let Some(name) = &chat_args.tool_choice {
        if !tools.iter().any(|t| &t.function.name == name) {
            return Err(LlamaError::ConfigError(format!(
                "--tool-choice names unknown tool '{}'",
                name
            )));
        }
        request = request.with_tool_choice(ToolChoice::function(name.clone()));
    }

    if let Some(path) = &chat_args.response_schema {
        request = request.with_response_format(load_response_format(path)?);
    }

    if config.verbose {
        eprintln!("{}", format!("[llama] Using model: {}", model).dimmed());
        if !tools.is_empty() {
            let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
            eprintln!("{}", format!("[llama] Tools: {}", names.join(", ")).dimmed());
        }
    }

    Ok((request, tools))
}

fn report_tool_calls(tools: &[Tool], calls: &[ToolCall]) {
    if tools.is_empty() {
        return;
    }
    for call in calls {
        let violations = validate_tool_call(tools, call);
        if !violations.is_empty() {
            display_tool_call_violations(call, &violations);
        }
    }
}
