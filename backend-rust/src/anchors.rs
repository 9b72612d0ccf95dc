//! Anchors file: `{ "A1": [x, y], ..., "_image_transform": { ... } }`.
//!
//! The reserved `_image_transform` key is split off before the anchor entries
//! are used; its absence means no floorplan calibration. Everything is
//! validated on load so later stages never see a half-formed record.

use std::path::Path;

use tokio::fs;
use tracing::{info, warn};
use uwb_types::{AnchorMap, AnchorsFile, Position};

use crate::calibration::Calibration;
use crate::error::AnchorFileError;

/// Validated contents of an anchors file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnchorConfig {
    pub anchors: AnchorMap,
    pub calibration: Option<Calibration>,
}

impl AnchorConfig {
    pub fn parse(text: &str) -> Result<Self, AnchorFileError> {
        let raw: AnchorsFile = serde_json::from_str(text)?;

        if let Some((id, _)) = raw.anchors.iter().find(|(_, xy)| !Position::from(**xy).is_finite()) {
            return Err(AnchorFileError::InvalidAnchor { id: id.clone() });
        }
        let calibration = raw.image_transform.as_ref().map(Calibration::try_from).transpose()?;

        Ok(Self { anchors: raw.anchor_map(), calibration })
    }

    pub fn to_json(&self) -> Result<String, AnchorFileError> {
        let raw = AnchorsFile {
            anchors: self.anchors.iter().map(|(id, p)| (id.clone(), p.to_array())).collect(),
            image_transform: self.calibration.as_ref().map(Calibration::to_record),
        };
        Ok(serde_json::to_string_pretty(&raw)?)
    }
}

/// Load and validate the anchors file. A missing file is an empty layout.
pub async fn load_anchors(path: &Path) -> Result<AnchorConfig, AnchorFileError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No anchors file at {}, starting with no anchors", path.display());
            return Ok(AnchorConfig::default());
        }
        Err(source) => return Err(AnchorFileError::Io { path: path.to_path_buf(), source }),
    };

    let config = AnchorConfig::parse(&text)?;
    info!(
        "Loaded {} anchors from {} (floorplan calibration: {})",
        config.anchors.len(),
        path.display(),
        if config.calibration.is_some() { "yes" } else { "no" }
    );
    Ok(config)
}

/// Write the anchors file, pretty-printed, with the calibration under the reserved key.
pub async fn save_anchors(path: &Path, config: &AnchorConfig) -> Result<(), AnchorFileError> {
    let json = config.to_json()?;
    fs::write(path, json)
        .await
        .map_err(|source| AnchorFileError::Io { path: path.to_path_buf(), source })?;
    info!("Anchors saved to {}", path.display());
    Ok(())
}
