//! Typed model of the server creation request body.

use std::collections::HashMap;

use serde::Deserialize;

/// Body of a create-server request: `{"server": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServerRequest {
    /// The requested server description.
    pub server: ServerSpec,
}

/// The `server` object inside a creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSpec {
    /// Proposed server name.
    pub name: String,

    /// Arbitrary string-to-string metadata. Also the carrier for the
    /// recognized override keys (see [`crate::behavior::metadata_override`]).
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Flavor reference.
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,

    /// Image reference; the simulated backend accepts its absence.
    #[serde(rename = "imageRef", default)]
    pub image_ref: Option<String>,

    /// Requested disk configuration; must be `AUTO` or `MANUAL` if present.
    #[serde(rename = "OS-DCF:diskConfig", default)]
    pub disk_config: Option<String>,
}
