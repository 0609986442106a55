//! Wire types for the detector protocol, with a publishable JSON schema.

use super::Detection;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// One request line on the detector's stdin.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireRequest {
    /// Correlates a reply with its request.
    pub id: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// The frame as a base64-encoded grayscale PNG.
    pub image_png: String,
}

/// One reply line on the detector's stdout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WireReply {
    /// Echo of the request id.
    pub id: u64,
    /// Everything the detector found, filtered downstream.
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// JSON schema for both sides of the detector protocol. Printed by the CLI
/// so detector authors can validate their implementation.
pub fn detector_wire_schema() -> serde_json::Value {
    serde_json::json!({
        "request": schema_for!(WireRequest),
        "reply": schema_for!(WireReply),
    })
}
