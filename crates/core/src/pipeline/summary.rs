//! Result summaries folded together from analyzer findings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analyzer::{AlleleCall, Finding, GeneHit, ItemOutput};
use crate::task::AnalysisType;

/// A dataset the analyzer could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub dataset_id: String,
    pub message: String,
}

/// Sequence type assigned to one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingAssignment {
    pub dataset_id: String,
    pub sequence_type: String,
    pub confidence: f64,
    pub alleles: Vec<AlleleCall>,
}

/// Genes detected in one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneProfile {
    pub dataset_id: String,
    pub hits: Vec<GeneHit>,
}

/// Type-specific part of a result summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDetails {
    Annotation {
        genes_predicted: u64,
        proteins_annotated: u64,
    },
    SequenceTyping {
        assignments: Vec<TypingAssignment>,
    },
    ResistanceGenes {
        profiles: Vec<GeneProfile>,
        /// Gene name to number of datasets carrying it.
        prevalence: BTreeMap<String, usize>,
    },
    VirulenceGenes {
        profiles: Vec<GeneProfile>,
        prevalence: BTreeMap<String, usize>,
    },
    Phylogeny {
        taxa: Vec<String>,
        snp_count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tree_file: Option<PathBuf>,
    },
}

impl ResultDetails {
    /// Details with nothing recorded yet.
    pub fn empty(analysis_type: AnalysisType) -> Self {
        match analysis_type {
            AnalysisType::Annotation => ResultDetails::Annotation {
                genes_predicted: 0,
                proteins_annotated: 0,
            },
            AnalysisType::SequenceTyping => ResultDetails::SequenceTyping {
                assignments: Vec::new(),
            },
            AnalysisType::ResistanceGenes => ResultDetails::ResistanceGenes {
                profiles: Vec::new(),
                prevalence: BTreeMap::new(),
            },
            AnalysisType::VirulenceGenes => ResultDetails::VirulenceGenes {
                profiles: Vec::new(),
                prevalence: BTreeMap::new(),
            },
            AnalysisType::Phylogeny => ResultDetails::Phylogeny {
                taxa: Vec::new(),
                snp_count: 0,
                tree_file: None,
            },
        }
    }

    /// Fold one finding in. Hands the finding back if it does not belong to
    /// this kind of result.
    fn absorb(&mut self, dataset_id: &str, finding: Finding) -> Result<(), Finding> {
        match (self, finding) {
            (
                ResultDetails::Annotation {
                    genes_predicted,
                    proteins_annotated,
                },
                Finding::Annotation {
                    genes_predicted: genes,
                    proteins_annotated: proteins,
                },
            ) => {
                *genes_predicted += genes;
                *proteins_annotated += proteins;
            }
            (
                ResultDetails::SequenceTyping { assignments },
                Finding::SequenceType {
                    sequence_type,
                    confidence,
                    alleles,
                },
            ) => assignments.push(TypingAssignment {
                dataset_id: dataset_id.to_string(),
                sequence_type,
                confidence,
                alleles,
            }),
            (
                ResultDetails::ResistanceGenes {
                    profiles,
                    prevalence,
                }
                | ResultDetails::VirulenceGenes {
                    profiles,
                    prevalence,
                },
                Finding::Genes(hits),
            ) => {
                for hit in &hits {
                    *prevalence.entry(hit.name.clone()).or_default() += 1;
                }
                profiles.push(GeneProfile {
                    dataset_id: dataset_id.to_string(),
                    hits,
                });
            }
            (ResultDetails::Phylogeny { .. }, Finding::Taxon { .. }) => {}
            (
                ResultDetails::Phylogeny {
                    taxa,
                    snp_count,
                    tree_file,
                },
                Finding::Tree {
                    taxa: tree_taxa,
                    snp_count: tree_snps,
                    tree_file: file,
                },
            ) => {
                *taxa = tree_taxa;
                *snp_count = tree_snps;
                *tree_file = Some(file);
            }
            (_, finding) => return Err(finding),
        }
        Ok(())
    }
}

/// Structured outcome of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub analysis_type: AnalysisType,
    /// Datasets processed without error.
    pub datasets_processed: usize,
    /// Task output area.
    pub output_dir: PathBuf,
    /// Artifacts written, in the order they were produced.
    pub output_files: Vec<PathBuf>,
    /// Datasets skipped because of a per-dataset error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
    pub details: ResultDetails,
}

impl ResultSummary {
    pub fn new(analysis_type: AnalysisType, output_dir: &Path) -> Self {
        Self {
            analysis_type,
            datasets_processed: 0,
            output_dir: output_dir.to_path_buf(),
            output_files: Vec::new(),
            failures: Vec::new(),
            details: ResultDetails::empty(analysis_type),
        }
    }

    /// Record a successfully processed dataset.
    pub fn record_item(&mut self, dataset_id: &str, output: ItemOutput) -> Result<(), String> {
        self.fold(dataset_id, output)?;
        self.datasets_processed += 1;
        Ok(())
    }

    /// Record the combine step's output.
    pub fn record_combined(&mut self, output: ItemOutput) -> Result<(), String> {
        self.fold("", output)
    }

    pub fn record_failure(&mut self, dataset_id: &str, message: impl Into<String>) {
        self.failures.push(ItemFailure {
            dataset_id: dataset_id.to_string(),
            message: message.into(),
        });
    }

    fn fold(&mut self, dataset_id: &str, output: ItemOutput) -> Result<(), String> {
        self.details
            .absorb(dataset_id, output.finding)
            .map_err(|finding| {
                format!(
                    "{} analyzer produced a {} finding",
                    self.analysis_type,
                    finding.kind()
                )
            })?;
        self.output_files.extend(output.artifacts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genes(names: &[&str]) -> ItemOutput {
        ItemOutput::new(Finding::Genes(
            names
                .iter()
                .map(|n| GeneHit {
                    name: n.to_string(),
                    score: 0.95,
                })
                .collect(),
        ))
    }

    #[test]
    fn test_annotation_totals_accumulate() {
        let mut summary = ResultSummary::new(AnalysisType::Annotation, Path::new("/out/task_1"));
        for (genes, proteins, file) in [(3000, 2550, "a.gff"), (3500, 2975, "b.gff")] {
            summary
                .record_item(
                    "g",
                    ItemOutput::new(Finding::Annotation {
                        genes_predicted: genes,
                        proteins_annotated: proteins,
                    })
                    .with_artifact(PathBuf::from(file)),
                )
                .unwrap();
        }

        assert_eq!(summary.datasets_processed, 2);
        assert_eq!(summary.output_files.len(), 2);
        assert_eq!(
            summary.details,
            ResultDetails::Annotation {
                genes_predicted: 6500,
                proteins_annotated: 5525
            }
        );
    }

    #[test]
    fn test_gene_prevalence_counts_datasets() {
        let mut summary = ResultSummary::new(AnalysisType::ResistanceGenes, Path::new("/out"));
        summary.record_item("g1", genes(&["qnrS1", "tet(A)"])).unwrap();
        summary.record_item("g2", genes(&["qnrS1"])).unwrap();
        summary.record_item("g3", genes(&[])).unwrap();

        match &summary.details {
            ResultDetails::ResistanceGenes {
                profiles,
                prevalence,
            } => {
                assert_eq!(profiles.len(), 3);
                assert_eq!(prevalence.get("qnrS1"), Some(&2));
                assert_eq!(prevalence.get("tet(A)"), Some(&1));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_finding_is_rejected() {
        let mut summary = ResultSummary::new(AnalysisType::SequenceTyping, Path::new("/out"));
        let err = summary.record_item("g1", genes(&["fimH"])).unwrap_err();
        assert!(err.contains("sequence_typing"));
        assert_eq!(summary.datasets_processed, 0);
    }

    #[test]
    fn test_tree_fills_phylogeny_details() {
        let mut summary = ResultSummary::new(AnalysisType::Phylogeny, Path::new("/out"));
        summary
            .record_item("g1", ItemOutput::new(Finding::Taxon { variable_sites: 10 }))
            .unwrap();
        summary
            .record_combined(
                ItemOutput::new(Finding::Tree {
                    taxa: vec!["a".into(), "b".into()],
                    snp_count: 1234,
                    tree_file: PathBuf::from("/out/phylogeny.nwk"),
                })
                .with_artifact(PathBuf::from("/out/phylogeny.nwk")),
            )
            .unwrap();

        assert_eq!(summary.datasets_processed, 1);
        assert_eq!(summary.output_files, vec![PathBuf::from("/out/phylogeny.nwk")]);
        assert!(matches!(
            summary.details,
            ResultDetails::Phylogeny { snp_count: 1234, ref tree_file, .. } if tree_file.is_some()
        ));
    }

    #[test]
    fn test_failures_are_recorded_and_serialized() {
        let mut summary = ResultSummary::new(AnalysisType::VirulenceGenes, Path::new("/out"));
        summary.record_failure("g2", "assembly truncated");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failures"][0]["dataset_id"], "g2");
        assert_eq!(json["details"]["kind"], "virulence_genes");

        let parsed: ResultSummary = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, summary);
    }
}
