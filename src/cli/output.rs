//! Output formatting for command results and link events

use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Display;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

/// Render a value in the requested format
pub fn render<T: Serialize + Display>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Json => serde_json::to_string(value).unwrap_or_else(|e| {
            serde_json::json!({ "event": "error", "message": e.to_string() }).to_string()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decoder::DistanceEvent;

    #[test]
    fn test_render_event() {
        let event = DistanceEvent::Reading { distance_cm: 150 };
        assert_eq!(render(&event, OutputFormat::Text), "distance: 150 cm");
        assert_eq!(
            render(&event, OutputFormat::Json),
            r#"{"event":"reading","distance_cm":150}"#
        );
    }
}
