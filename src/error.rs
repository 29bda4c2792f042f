use crate::node::{LineInfo, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArborError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index {index} is out of range for a container of {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Format error: {message}{}", describe_location(.line_info))]
    Format {
        message: String,
        line_info: Option<LineInfo>,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Type shape unavailable: {0}")]
    ShapeUnavailable(String),

    #[error("Converter failed: {0}")]
    Converter(String),

    #[error("Encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ArborError {
    pub fn format(message: impl Into<String>, line_info: Option<LineInfo>) -> Self {
        ArborError::Format {
            message: message.into(),
            line_info,
        }
    }

    /// Line information captured when the error was raised, if any.
    pub fn line_info(&self) -> Option<LineInfo> {
        match self {
            ArborError::Format { line_info, .. } => *line_info,
            _ => None,
        }
    }
}

fn describe_location(line_info: &Option<LineInfo>) -> String {
    match line_info {
        Some(info) => format!(", line {}, position {}", info.line, info.position),
        None => String::new(),
    }
}
