//! Marketing pixel port. The pixel vendor is separate from the tracking
//! collector and has its own event vocabulary.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum PixelEvent {
    ViewContent {
        content_name: String,
        value: f64,
        currency: String,
    },
    AddToCart {
        content_name: String,
        value: f64,
        currency: String,
    },
    Lead {
        content_name: String,
    },
    /// `fbq('trackCustom', name, params)`.
    Custom {
        name: String,
        params: serde_json::Value,
    },
}

impl PixelEvent {
    pub fn name(&self) -> &str {
        match self {
            PixelEvent::ViewContent { .. } => "ViewContent",
            PixelEvent::AddToCart { .. } => "AddToCart",
            PixelEvent::Lead { .. } => "Lead",
            PixelEvent::Custom { name, .. } => name,
        }
    }
}

pub trait PixelSink: Send + Sync {
    fn track(&self, event: PixelEvent);
}

pub struct NoOpPixelSink;

impl PixelSink for NoOpPixelSink {
    fn track(&self, _event: PixelEvent) {}
}

/// Records pixel calls for assertions.
#[derive(Default)]
pub struct CapturePixelSink {
    events: Mutex<Vec<PixelEvent>>,
}

impl CapturePixelSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PixelEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name().to_string()).collect()
    }
}

impl PixelSink for CapturePixelSink {
    fn track(&self, event: PixelEvent) {
        self.events.lock().push(event);
    }
}

pub fn noop_pixel() -> Arc<dyn PixelSink> {
    Arc::new(NoOpPixelSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_wire_shape() {
        let json = serde_json::to_value(PixelEvent::Lead {
            content_name: "free_plan".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "Lead");
        assert_eq!(json["content_name"], "free_plan");

        let custom = PixelEvent::Custom {
            name: "ExitIntent".into(),
            params: serde_json::json!({"tier": "premium"}),
        };
        assert_eq!(custom.name(), "ExitIntent");
    }
}
