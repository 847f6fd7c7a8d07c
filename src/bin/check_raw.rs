use colored::*;
use futures::StreamExt;
use std::env;

use llama_cli::api::client::CHAT_COMPLETIONS_PATH;
use llama_cli::api::{decode_event, HttpTransport, Transport};
use llama_cli::cli::GlobalOptions;
use llama_cli::config::Config;
use llama_cli::models::{ChatRequest, Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <prompt>", args[0]);
        std::process::exit(1);
    }
    let prompt = &args[1];

    let config = Config::from_env_and_args(&GlobalOptions::default())?;
    let model = config.require_model()?.to_string();

    println!("{}", format!("Using model: {}", model).green());
    println!("{}", format!("Prompt: {}", prompt).cyan());
    println!("{}", "-".repeat(80).dimmed());

    let mut request = ChatRequest::new(model, vec![Message::user(prompt.clone())]);
    request.stream = Some(true);

    println!("{}", "Request payload:".bold());
    println!("{}", serde_json::to_string_pretty(&request)?);
    println!("{}", "-".repeat(80).dimmed());

    let transport = HttpTransport::new(&config.api_key, &config.api_endpoint, config.stream_timeout)?;
    let mut frames = transport
        .post_stream(CHAT_COMPLETIONS_PATH, serde_json::to_string(&request)?)
        .await?;

    println!("{}", "Raw frames:".bold());
    println!("{}", "-".repeat(80).dimmed());

    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        count += 1;
        println!("{}", format!("#{} {}", count, frame).dimmed());

        match decode_event(&frame) {
            Ok(event) => {
                print!("{} ", event.event_type.to_string().green());
                if let Some(delta) = &event.delta {
                    print!("{}", format!("[{}]", delta.delta_type).yellow());
                    if let Some(text) = &delta.text {
                        print!(" text={:?}", text);
                    }
                    if let Some(reasoning) = &delta.reasoning {
                        print!(" reasoning={:?}", reasoning);
                    }
                    if let Some(answer) = &delta.answer {
                        print!(" answer={:?}", answer);
                    }
                    if let Some(id) = &delta.id {
                        print!(" id={}", id);
                    }
                    if let Some(function) = &delta.function {
                        print!(
                            " name={:?} arguments={:?}",
                            function.name.as_deref().unwrap_or(""),
                            function.arguments.as_deref().unwrap_or("")
                        );
                    }
                }
                if let Some(reason) = &event.stop_reason {
                    print!(" {}", format!("stop_reason={}", reason).cyan());
                }
                println!();
            }
            Err(e) => {
                eprintln!("{}", format!("Decode error: {}", e).red());
            }
        }
    }

    println!("{}", "-".repeat(80).dimmed());
    println!("{}", format!("Stream ended after {} frames", count).green());

    Ok(())
}
