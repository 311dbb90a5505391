//! Logical schema of the persisted tally store.
//!
//! One JSON document holds every exported estimator (keyed by estimator id,
//! then entity id) and every particle tracker's history map. Ordered maps keep
//! the serialized form deterministic.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use mc_core::{EntityId, Error, ObserverId, ParticleType, Result};
use mc_tally::{
    BinBoundaries, Dimension, EntityType, EstimatorKind, HistoryMap, MomentPair, MomentQuad,
    ProcessedPair, ProcessedQuad,
};
use serde::{Deserialize, Serialize};

/// Schema identifier written into every store.
pub const SCHEMA_VERSION: &str = "mctally.tally_store.v1";

/// Identifier and name of one response function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunctionEntry {
    /// Position in the estimator's response set.
    pub id: usize,
    /// Response name.
    pub name: String,
}

/// Configuration needed to decode an estimator's arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorMetadata {
    /// Multiplier applied to processed means.
    pub multiplier: f64,
    /// Estimator flavour.
    pub kind: EstimatorKind,
    /// Entity type scored.
    pub entity_type: EntityType,
    /// Assigned particle types.
    pub particle_types: Vec<ParticleType>,
    /// Response functions in cell order.
    pub response_functions: Vec<ResponseFunctionEntry>,
    /// Active dimensions; the first varies fastest in a bin index.
    pub dimension_ordering: Vec<Dimension>,
    /// Boundaries of every active dimension.
    pub bin_boundaries: BTreeMap<Dimension, BinBoundaries>,
    /// Sum of the entity normalization constants.
    pub total_normalization: f64,
}

/// Raw (and optionally processed) moments of one entity or of the
/// estimator-wide total.
///
/// Binned arrays have `response_functions × bins` cells laid out as
/// `response * bins + bin`; total arrays have one cell per response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentRecord {
    /// Normalization constant used for the processed means.
    pub normalization: f64,
    /// Raw `(S1, S2)` per binned cell.
    pub raw_bin_moments: Vec<MomentPair>,
    /// Raw `(S1..S4)` per response.
    pub raw_total_moments: Vec<MomentQuad>,
    /// Processed binned cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_bin_moments: Option<Vec<ProcessedPair>>,
    /// Processed totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_total_moments: Option<Vec<ProcessedQuad>>,
}

/// Everything exported for one estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorRecord {
    /// Configuration.
    pub metadata: EstimatorMetadata,
    /// Per-entity moments.
    pub entities: BTreeMap<EntityId, MomentRecord>,
    /// Estimator-wide moments (summed over entities).
    pub total: MomentRecord,
}

/// The persisted tally store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyStore {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// Estimator records by id.
    #[serde(default)]
    pub estimators: BTreeMap<ObserverId, EstimatorRecord>,
    /// Particle tracker data by tracker id.
    #[serde(default)]
    pub particle_trackers: BTreeMap<ObserverId, HistoryMap>,
}

impl Default for TallyStore {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            estimators: BTreeMap::new(),
            particle_trackers: BTreeMap::new(),
        }
    }
}

impl TallyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of estimator `id`.
    pub fn estimator(&self, id: ObserverId) -> Option<&EstimatorRecord> {
        self.estimators.get(&id)
    }

    /// Pretty JSON form.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a store, rejecting unknown schema versions.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let store: TallyStore = serde_json::from_str(json)?;
        if store.schema_version != SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "unsupported tally store schema '{}' (expected '{SCHEMA_VERSION}')",
                store.schema_version
            )));
        }
        Ok(store)
    }

    /// Write to `path` through a sibling temporary file and a rename, so a
    /// crash never leaves a truncated store behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = temporary_sibling(path);
        fs::write(&tmp, self.to_json_string()?)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!(
            "wrote tally store with {} estimator(s) to {}",
            self.estimators.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a store written by [`Self::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_round_trip() {
        let store = TallyStore::new();
        let json = store.to_json_string().unwrap();
        assert!(json.contains(SCHEMA_VERSION));
        assert_eq!(TallyStore::from_json_str(&json).unwrap(), store);
    }

    #[test]
    fn test_rejects_foreign_schema() {
        let err = TallyStore::from_json_str(r#"{"schema_version": "other.v9"}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_save_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tallies.json");
        TallyStore::new().save(&path).unwrap();
        TallyStore::new().save(&path).unwrap();
        assert!(!dir.path().join("tallies.json.tmp").exists());
        assert_eq!(TallyStore::load(&path).unwrap(), TallyStore::new());
    }

    #[test]
    fn test_temporary_sibling_name() {
        let tmp = temporary_sibling(Path::new("/a/b/out.json"));
        assert_eq!(tmp, PathBuf::from("/a/b/out.json.tmp"));
    }
}
