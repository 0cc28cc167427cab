//! JSON renderer

use bytes::Bytes;

use super::{Event, Render, RenderError};

/// Renders events as JSON objects tagged by `type`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Render for JsonRenderer {
    fn render(&self, event: &Event) -> Result<Bytes, RenderError> {
        let body = serde_json::to_vec(event)?;
        Ok(Bytes::from(body))
    }
}
