//! Tool Argument Validation
//!
//! Compiles each registered tool's `inputSchema` and checks call arguments
//! against it before the tool handler runs.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::Tool;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Compiled input schema for a single tool
pub struct ArgumentValidator {
    tool: String,
    schema: JSONSchema,
}

impl ArgumentValidator {
    /// Compile the tool's input schema (draft 7)
    #[inline]
    pub fn for_tool(tool: &Tool) -> McpResult<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&tool.input_schema)
            .map_err(|e| McpError::InternalError {
                message: format!("Failed to compile input schema for '{}': {}", tool.name, e),
            })?;

        debug!("Compiled input schema for tool: {}", tool.name);
        Ok(Self {
            tool: tool.name.clone(),
            schema,
        })
    }

    /// Validate call arguments, treating absent arguments as an empty object
    #[inline]
    pub fn validate(&self, arguments: Option<&HashMap<String, Value>>) -> McpResult<()> {
        let instance = Value::Object(
            arguments
                .map(|args| args.clone().into_iter().collect())
                .unwrap_or_default(),
        );

        if let Err(errors) = self.schema.validate(&instance) {
            let error_messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();

            return Err(McpError::InvalidToolParameters {
                tool: self.tool.clone(),
                message: error_messages.join(", "),
            });
        }

        Ok(())
    }
}
