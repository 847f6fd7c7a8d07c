use crate::models::{ResponseFormat, Tool, ToolCall};
use anyhow::{bail, Context, Result};
use jsonschema::{Draft, JSONSchema};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolFile {
    List(Vec<Tool>),
    Wrapped { tools: Vec<Tool> },
}

/// Load tool definitions from a YAML or JSON file. Every `parameters`
/// document has to compile as a draft 7 JSON Schema.
pub fn load_tool_definitions(path: &Path) -> Result<Vec<Tool>> {
    let value = read_structured(path)?;
    let tools = match serde_json::from_value::<ToolFile>(value)
        .with_context(|| format!("Invalid tool definitions in {}", path.display()))?
    {
        ToolFile::List(tools) => tools,
        ToolFile::Wrapped { tools } => tools,
    };

    for tool in &tools {
        if let Some(parameters) = &tool.function.parameters {
            compile_schema(parameters)
                .map_err(|e| anyhow::anyhow!("Tool '{}': {}", tool.function.name, e))?;
        }
    }

    Ok(tools)
}

/// Load a JSON Schema file as a `json_schema` response format named after
/// the file stem.
pub fn load_response_format(path: &Path) -> Result<ResponseFormat> {
    let schema = read_structured(path)?;
    compile_schema(&schema).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("response")
        .to_string();
    Ok(ResponseFormat::json_schema(name, schema))
}

/// Check a fully assembled tool call against the schema of the tool it
/// names. Returns one message per problem; empty means the call is valid.
pub fn validate_tool_call(tools: &[Tool], call: &ToolCall) -> Vec<String> {
    let Some(tool) = tools.iter().find(|t| t.function.name == call.function.name) else {
        return vec![format!("Unknown tool '{}'", call.function.name)];
    };

    let arguments: Value = match serde_json::from_str(&call.function.arguments) {
        Ok(value) => value,
        Err(e) => return vec![format!("Arguments are not valid JSON: {}", e)],
    };

    let Some(parameters) = &tool.function.parameters else {
        return Vec::new();
    };

    let schema = match compile_schema(parameters) {
        Ok(schema) => schema,
        Err(e) => return vec![e],
    };

    let violations = match schema.validate(&arguments) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect(),
    };
    violations
}

fn compile_schema(schema: &Value) -> std::result::Result<JSONSchema, String> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| format!("Invalid JSON schema: {}", e))
}

fn read_structured(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display())),
        Some("json") | None => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON file: {}", path.display())),
        Some(other) => bail!("Unsupported file extension '{}': {}", other, path.display()),
    }
}
