//! Dataset catalog types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered genome dataset that analyses can reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Catalog identifier.
    pub id: String,
    /// Display name, used to name output artifacts.
    pub name: String,
    /// Strain the genome belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strain: Option<String>,
    /// Location of the assembly (FASTA).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Assembly length in bases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_length: Option<u64>,
    /// GC content in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_content: Option<f64>,
    pub registered_at: DateTime<Utc>,
}

impl DatasetRecord {
    /// Prefix for artifacts written for this dataset.
    ///
    /// Display names are not unique in the catalog, so the id leads.
    pub fn artifact_stem(&self) -> String {
        let id = sanitize(&self.id);
        let name = sanitize(&self.name);
        if name.is_empty() || name == id {
            id
        } else {
            format!("{}_{}", id, name)
        }
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> DatasetRecord {
        DatasetRecord {
            id: "g1".to_string(),
            name: name.to_string(),
            strain: None,
            file_path: None,
            total_length: None,
            gc_content: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_artifact_stem_replaces_unsafe_characters() {
        assert_eq!(
            record("E. coli K-12/MG1655").artifact_stem(),
            "g1_E._coli_K-12_MG1655"
        );
    }

    #[test]
    fn test_artifact_stem_leads_with_id() {
        assert_eq!(record("E. coli").artifact_stem(), "g1_E._coli");
        assert_eq!(record("").artifact_stem(), "g1");
        assert_eq!(record("g1").artifact_stem(), "g1");
    }
}
