//! Rebuild progress events and their newline-delimited JSON frames.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RebuildEvent {
    Status {
        message: String,
    },
    Log {
        message: String,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
    Complete {
        message: String,
        total: usize,
        recreated: usize,
        errors: usize,
    },
}

impl RebuildEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Status { message }
            | Self::Log { message }
            | Self::Warning { message }
            | Self::Error { message }
            | Self::Complete { message, .. } => message,
        }
    }

    /// True for the terminal `complete` event.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// One JSON object followed by `\n`.
    pub fn to_frame(&self) -> String {
        let mut frame = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"unencodable event: {e}"}}"#)
        });
        frame.push('\n');
        frame
    }
}

/// A frame as a consumer sees it. Types this build does not know are kept
/// and should be shown as informational.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub recreated: Option<usize>,
    #[serde(default)]
    pub errors: Option<usize>,
}

impl ProgressFrame {
    pub fn parse(line: &str) -> gsync_core::Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// The typed event, or `None` for an unrecognised type.
    pub fn event(&self) -> Option<RebuildEvent> {
        let message = self.message.clone();
        Some(match self.kind.as_str() {
            "status" => RebuildEvent::Status { message },
            "log" => RebuildEvent::Log { message },
            "warning" => RebuildEvent::Warning { message },
            "error" => RebuildEvent::Error { message },
            "complete" => RebuildEvent::Complete {
                message,
                total: self.total.unwrap_or_default(),
                recreated: self.recreated.unwrap_or_default(),
                errors: self.errors.unwrap_or_default(),
            },
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_shape() {
        let frame = RebuildEvent::status("Building image").to_frame();
        assert_eq!(frame, "{\"type\":\"status\",\"message\":\"Building image\"}\n");

        let complete = RebuildEvent::Complete {
            message: "done".into(),
            total: 3,
            recreated: 2,
            errors: 1,
        };
        let value: serde_json::Value = serde_json::from_str(&complete.to_frame()).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["recreated"], 2);
        assert_eq!(value["errors"], 1);
    }

    #[test]
    fn test_unknown_frame_types_are_tolerated() {
        let frame = ProgressFrame::parse(r#"{"type":"heartbeat","message":"still here","extra":1}"#)
            .unwrap();
        assert_eq!(frame.kind, "heartbeat");
        assert_eq!(frame.event(), None);

        let frame = ProgressFrame::parse(r#"{"type":"warning","message":"image busy"}"#).unwrap();
        assert_eq!(frame.event(), Some(RebuildEvent::warning("image busy")));
    }
}
