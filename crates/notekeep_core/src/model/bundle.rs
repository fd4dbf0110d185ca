//! Bundle wire format for export, import and full restore.
//!
//! # Responsibility
//! - Define the serialized snapshot of all entities exchanged between
//!   installations.
//! - Parse legacy exports (separate `images`/`audios` arrays, no schema
//!   version tag) without loss.
//!
//! # Invariants
//! - A bundle that fails to parse is the only structural abort of the
//!   import pipeline; everything past parsing degrades per item.
//! - `schema_version` absent means version 1 (pre-versioning exports).
//! - Unknown future schema versions are rejected at parse time.

use crate::model::asset::{Asset, AssetKind};
use crate::model::entity::{Folder, Note, NoteHistory, NoteTemplate, Task, TaskTemplate, Workspace};
use crate::model::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Latest bundle schema understood by this binary.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Result type for bundle parsing.
pub type BundleResult<T> = Result<T, BundleError>;

/// Structural bundle failure; aborts the import pipeline outright.
#[derive(Debug)]
pub enum BundleError {
    /// The payload is not valid bundle JSON.
    Parse(serde_json::Error),
    /// The bundle was produced by a newer schema than this binary supports.
    UnsupportedSchemaVersion { found: u32, supported: u32 },
}

impl Display for BundleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid bundle payload: {err}"),
            Self::UnsupportedSchemaVersion { found, supported } => write!(
                f,
                "bundle schema version {found} is newer than supported {supported}"
            ),
        }
    }
}

impl Error for BundleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Template collections carried by a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBundle {
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
    #[serde(default)]
    pub notes: Vec<NoteTemplate>,
}

/// The unit of import/export: one snapshot of every persisted collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Schema tag; absent in legacy exports, treated as version 1.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub standalone_notes: Vec<Note>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub templates: TemplateBundle,
    #[serde(default)]
    pub media: Vec<Asset>,
    /// Legacy export array; folded into `media` as images on ingest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Asset>,
    /// Legacy export array; folded into `media` as audio on ingest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<Asset>,
    /// Note revision histories keyed by note id.
    #[serde(default)]
    pub note_histories: HashMap<EntityId, NoteHistory>,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            workspaces: Vec::new(),
            tasks: Vec::new(),
            standalone_notes: Vec::new(),
            folders: Vec::new(),
            templates: TemplateBundle::default(),
            media: Vec::new(),
            images: Vec::new(),
            audios: Vec::new(),
            note_histories: HashMap::new(),
        }
    }
}

impl Bundle {
    /// Parses a bundle from its JSON payload.
    ///
    /// # Errors
    /// - `BundleError::Parse` when the payload is not bundle-shaped JSON.
    /// - `BundleError::UnsupportedSchemaVersion` for future schema tags.
    pub fn from_json(payload: &str) -> BundleResult<Self> {
        let bundle: Bundle = serde_json::from_str(payload)?;
        if bundle.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(BundleError::UnsupportedSchemaVersion {
                found: bundle.schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(bundle)
    }

    /// Serializes this bundle to its JSON payload.
    pub fn to_json(&self) -> BundleResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// All bundled assets with the legacy `images`/`audios` arrays folded in.
    ///
    /// Legacy arrays predate the `kind` field, so their entries get the kind
    /// implied by the array they came from.
    pub fn all_media(&self) -> Vec<Asset> {
        let mut merged =
            Vec::with_capacity(self.media.len() + self.images.len() + self.audios.len());
        merged.extend(self.media.iter().cloned());
        merged.extend(self.images.iter().cloned().map(|mut asset| {
            asset.kind = AssetKind::Image;
            asset
        }));
        merged.extend(self.audios.iter().cloned().map(|mut asset| {
            asset.kind = AssetKind::Audio;
            asset
        }));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::{Bundle, BundleError, CURRENT_SCHEMA_VERSION};
    use crate::model::asset::AssetKind;

    #[test]
    fn empty_object_parses_as_legacy_version_1() {
        let bundle = Bundle::from_json("{}").unwrap();
        assert_eq!(bundle.schema_version, 1);
        assert!(bundle.workspaces.is_empty());
        assert!(bundle.note_histories.is_empty());
    }

    #[test]
    fn future_schema_version_is_rejected() {
        let payload = format!("{{\"schemaVersion\": {}}}", CURRENT_SCHEMA_VERSION + 1);
        let err = Bundle::from_json(&payload).unwrap_err();
        assert!(matches!(
            err,
            BundleError::UnsupportedSchemaVersion { found, .. } if found == CURRENT_SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let err = Bundle::from_json("not json").unwrap_err();
        assert!(matches!(err, BundleError::Parse(_)));
    }

    #[test]
    fn legacy_arrays_fold_into_media_with_implied_kinds() {
        let payload = r#"{
            "images": [{"id": "img-1", "bytes": [1], "size": 1}],
            "audios": [{"id": "aud-1", "bytes": [2], "size": 1}]
        }"#;
        let bundle = Bundle::from_json(payload).unwrap();
        let media = bundle.all_media();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].kind, AssetKind::Image);
        assert_eq!(media[1].kind, AssetKind::Audio);
    }
}
