//! Values produced by analyzers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetRecord;

/// One locus of an allele profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleCall {
    pub locus: String,
    pub allele: u32,
}

/// A detected gene and its match score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneHit {
    pub name: String,
    pub score: f64,
}

/// The structured finding for one dataset, or for the combine step.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// Gene prediction counts.
    Annotation {
        genes_predicted: u64,
        proteins_annotated: u64,
    },
    /// Sequence type assignment.
    SequenceType {
        sequence_type: String,
        confidence: f64,
        alleles: Vec<AlleleCall>,
    },
    /// Genes found by a screen (resistance or virulence).
    Genes(Vec<GeneHit>),
    /// Per-taxon preparation ahead of a combined tree.
    Taxon { variable_sites: u64 },
    /// The combined tree over all successfully prepared taxa.
    Tree {
        taxa: Vec<String>,
        snp_count: u64,
        tree_file: PathBuf,
    },
}

impl Finding {
    pub fn kind(&self) -> &'static str {
        match self {
            Finding::Annotation { .. } => "annotation",
            Finding::SequenceType { .. } => "sequence_type",
            Finding::Genes(_) => "genes",
            Finding::Taxon { .. } => "taxon",
            Finding::Tree { .. } => "tree",
        }
    }
}

/// What an analyzer returns for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutput {
    pub finding: Finding,
    /// Files written to the output area.
    pub artifacts: Vec<PathBuf>,
}

impl ItemOutput {
    pub fn new(finding: Finding) -> Self {
        Self {
            finding,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, path: PathBuf) -> Self {
        self.artifacts.push(path);
        self
    }
}

/// A dataset that was processed successfully, handed to the combine step.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    pub dataset: DatasetRecord,
    pub finding: Finding,
}
