use crate::api::{Disposition, Snapshot, StreamUpdate};
use crate::models::{ChatResponse, Metric, Model, ToolCall};
use colored::*;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const REASONING_OPEN: &str = "┌─[REASONING]──────────────────────────────────────────────";
const REASONING_CLOSE: &str = "└──────────────────────────────────────────────────────────";

/// Writes a streaming completion to the terminal as its fragments arrive.
///
/// Reasoning goes in a dimmed box; text and answer fragments are printed
/// inline. Tool calls, the stop reason and metrics are printed once the
/// stream is over, from the final snapshot.
pub struct StreamPrinter<W: Write> {
    out: W,
    reasoning_open: bool,
    reasoning_exclude: bool,
    last_flush: Instant,
    flush_interval: Duration,
}

impl StreamPrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            reasoning_open: false,
            reasoning_exclude: false,
            last_flush: Instant::now(),
            flush_interval: Duration::from_millis(50),
        }
    }

    pub fn exclude_reasoning(mut self, exclude: bool) -> Self {
        self.reasoning_exclude = exclude;
        self
    }

    pub fn print_update(&mut self, update: &StreamUpdate) -> io::Result<()> {
        if update.disposition == Disposition::Ignored {
            return Ok(());
        }
        let Some(delta) = &update.event.delta else {
            return Ok(());
        };

        if let Some(reasoning) = delta.reasoning.as_deref().filter(|r| !r.is_empty()) {
            if !self.reasoning_exclude {
                if !self.reasoning_open {
                    writeln!(self.out, "{}", REASONING_OPEN.dimmed())?;
                    self.reasoning_open = true;
                }
                write!(self.out, "{}", reasoning.dimmed())?;
            }
        }

        for fragment in [delta.text.as_deref(), delta.answer.as_deref()]
            .into_iter()
            .flatten()
        {
            if fragment.is_empty() {
                continue;
            }
            self.close_reasoning()?;
            write!(self.out, "{}", fragment)?;
        }

        if self.last_flush.elapsed() > self.flush_interval {
            self.out.flush()?;
            self.last_flush = Instant::now();
        }
        Ok(())
    }

    /// Close any open block and print what only the final snapshot knows.
    pub fn finish(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.close_reasoning()?;
        if !snapshot.text.is_empty() || !snapshot.answer.is_empty() {
            writeln!(self.out)?;
        }

        write_tool_calls(&mut self.out, &snapshot.tool_calls)?;
        if let Some(reason) = &snapshot.stop_reason {
            writeln!(self.out, "{}", format!("[stop: {}]", reason).dimmed())?;
        }
        if let Some(metrics) = &snapshot.metrics {
            write_metrics(&mut self.out, metrics)?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn close_reasoning(&mut self) -> io::Result<()> {
        if self.reasoning_open {
            writeln!(self.out)?;
            writeln!(self.out, "{}", REASONING_CLOSE.dimmed())?;
            self.reasoning_open = false;
        }
        Ok(())
    }
}

/// Print a non-streaming completion.
pub fn display_response<W: Write>(out: &mut W, response: &ChatResponse) -> io::Result<()> {
    let message = &response.completion_message;

    if let Some(reasoning) = message.content.reasoning.as_deref().filter(|r| !r.is_empty()) {
        writeln!(out, "{}", REASONING_OPEN.dimmed())?;
        writeln!(out, "{}", reasoning.trim_end().dimmed())?;
        writeln!(out, "{}", REASONING_CLOSE.dimmed())?;
    }
    for content in [message.content.text.as_deref(), message.content.answer.as_deref()]
        .into_iter()
        .flatten()
    {
        writeln!(out, "{}", content)?;
    }

    if let Some(calls) = &message.tool_calls {
        write_tool_calls(out, calls)?;
    }
    writeln!(out, "{}", format!("[stop: {}]", message.stop_reason).dimmed())?;
    if let Some(metrics) = &response.metrics {
        write_metrics(out, metrics)?;
    }
    out.flush()
}

pub fn display_models<W: Write>(out: &mut W, models: &[Model], verbose: bool) -> io::Result<()> {
    for model in models {
        if verbose {
            let created = model
                .created_at()
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| model.created.to_string());
            writeln!(
                out,
                "{}  {}",
                model.id,
                format!("({}, {})", model.owned_by, created).dimmed()
            )?;
        } else {
            writeln!(out, "{}", model.id)?;
        }
    }
    out.flush()
}

/// Schema problems found in an assembled tool call.
pub fn display_tool_call_violations(call: &ToolCall, violations: &[String]) {
    eprintln!(
        "{}",
        format!("Warning: tool call {} ({}) does not match its schema:", call.id, call.function.name)
            .yellow()
    );
    for violation in violations {
        eprintln!("{}", format!("  - {}", violation).yellow());
    }
}

fn write_tool_calls<W: Write>(out: &mut W, calls: &[ToolCall]) -> io::Result<()> {
    for call in calls {
        writeln!(
            out,
            "{} {}({})",
            format!("[tool call {}]", call.id).cyan(),
            call.function.name.bold(),
            call.function.arguments
        )?;
    }
    Ok(())
}

fn write_metrics<W: Write>(out: &mut W, metrics: &[Metric]) -> io::Result<()> {
    for metric in metrics {
        let line = match metric.unit.as_deref() {
            Some(unit) => format!("[{}: {} {}]", metric.metric, metric.value, unit),
            None => format!("[{}: {}]", metric.metric, metric.value),
        };
        writeln!(out, "{}", line.dimmed())?;
    }
    Ok(())
}
