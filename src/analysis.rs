//! Prompts sent to the extraction service and decoding of its replies.

use serde::Deserialize;
use tracing::debug;

use mcp_catalog_core::manifest::{Manifest, ServerConfig};
use mcp_catalog_core::metadata::CATEGORY_VOCABULARY;
use mcp_catalog_core::oracle::OracleError;
use mcp_catalog_core::tools::ToolDescriptor;

/// Decoded reply to [`manifest_prompt`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub name: String,
    pub description: String,
    /// Comma-joined tags, not yet normalized.
    pub category: String,
    pub configs: Manifest,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAnalysis {
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    configs: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTools {
    tools: Option<Vec<ToolDescriptor>>,
}

pub fn manifest_prompt(repo_name: &str, readme: &str, prior_manifest: Option<&str>) -> String {
    let categories = CATEGORY_VOCABULARY
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    let prior = match prior_manifest {
        Some(json) => format!(
            "\nThe catalog currently lists these configs for the repository. Keep names, \
             descriptions and flags consistent with them where the README still agrees:\n{}\n",
            json
        ),
        None => String::new(),
    };

    format!(
        r#"You are an expert on Model Context Protocol (MCP) servers. Read the README of the
repository {repo_name} below and describe how to launch the MCP server it documents.

Reply with one JSON object of this shape:

{{
  "name": "short display name",
  "description": "one or two sentences on what the server is for",
  "category": "comma-separated categories",
  "configs": [
    {{
      "command": "npx | uvx | uv | docker",
      "args": ["..."],
      "env": [
        {{"key": "API_KEY", "value": "", "name": "api key", "description": "...",
          "required": true, "sensitive": true, "file": false}}
      ]
    }},
    {{
      "url": "https://...",
      "urlDescription": "...",
      "httpHeaders": [
        {{"key": "Authorization", "value": "", "name": "token", "description": "...",
          "required": true, "sensitive": true}}
      ]
    }}
  ]
}}

Rules:
- If the README does not document an MCP server launch configuration (usually an
  "mcpServers": {{ ... }} JSON block), reply with an empty object {{}}.
- Only report command-based configs launched with npx, uv, uvx or docker.
- A config is either command-based (command, args, env) or url-based (url,
  urlDescription, httpHeaders). Never fill both shapes in one config.
- Environment variable keys are usually UPPER_CASE; name is a friendly lowercase label.
  Set file to true when the value is a path to a file.
- Only list environment variables and headers the README actually mentions. Do not
  invent any; use an empty array when there are none.
- Pick one or more categories from this list, joined with commas:
{categories}
{prior}
README:
{readme}
"#
    )
}

pub fn tools_prompt(source: &str, readme: &str) -> String {
    format!(
        r#"You extract MCP tool definitions from source code.

Reply with one JSON object of this shape:

{{
  "tools": [
    {{
      "name": "tool_name",
      "description": "what the tool does, briefly",
      "inputSchema": {{
        "properties": {{
          "param": {{"type": "string", "description": "what the parameter is for", "required": true}}
        }}
      }}
    }}
  ]
}}

TypeScript servers usually register tools with server.tool(...) or a tools list handler.
Python servers usually use the @mcp.tool() decorator.
If the source holds no tool definitions, use the README below to find tools it
documents. If neither mentions any tools, reply with {{"tools": []}}. Do not invent tools.

SOURCE:
{source}

README:
{readme}
"#
    )
}

fn malformed(err: serde_json::Error, raw: &str) -> OracleError {
    let preview: String = raw.chars().take(200).collect();
    OracleError::Malformed(format!("{} (reply started with: {})", err, preview))
}

/// Decode a manifest reply. Configs with neither a command nor a url are
/// dropped; an empty object decodes to an analysis with no configs.
pub fn parse_analysis(raw: &str) -> Result<Analysis, OracleError> {
    let parsed: RawAnalysis = serde_json::from_str(raw).map_err(|e| malformed(e, raw))?;

    let mut configs = Vec::new();
    for value in parsed.configs.unwrap_or_default() {
        match serde_json::from_value::<ServerConfig>(value) {
            Ok(config) => configs.push(config),
            Err(e) => debug!(error = %e, "dropping unusable server config"),
        }
    }

    Ok(Analysis {
        name: parsed.name.unwrap_or_default().trim().to_string(),
        description: parsed.description.unwrap_or_default().trim().to_string(),
        category: parsed.category.unwrap_or_default(),
        configs: Manifest::new(configs),
    })
}

/// Decode a tools reply. A reply without a `tools` key is an empty list.
pub fn parse_tools(raw: &str) -> Result<Vec<ToolDescriptor>, OracleError> {
    let parsed: RawTools = serde_json::from_str(raw).map_err(|e| malformed(e, raw))?;
    Ok(parsed
        .tools
        .unwrap_or_default()
        .into_iter()
        .filter(|t| !t.name.trim().is_empty())
        .collect())
}
