//! Deterministic stand-in analyzers.
//!
//! Every value is drawn from a SHA-256 stream seeded by the dataset id, so the
//! same dataset always yields the same finding. Artifacts use the same layouts
//! the real tools would leave behind (GFF3 header, allele profile, gene list,
//! Newick tree).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::dataset::DatasetRecord;
use crate::task::{AnalysisType, TaskParameters};

use super::error::AnalyzerError;
use super::output::OutputArea;
use super::traits::Analyzer;
use super::types::{AlleleCall, Finding, GeneHit, ItemOutput, ProcessedItem};

const MLST_LOCI: [&str; 7] = ["adk", "fumC", "gyrB", "icd", "mdh", "purA", "recA"];
const SEQUENCE_TYPES: [&str; 5] = ["ST-131", "ST-73", "ST-95", "ST-69", "ST-127"];
const RESISTANCE_PANEL: [&str; 5] = ["blaTEM-1", "aac(3)-IIa", "qnrS1", "tet(A)", "catA1"];
const VIRULENCE_PANEL: [&str; 6] = ["fimH", "stx1", "stx2", "eae", "hla", "hlb"];

/// Gene screens drop hits scoring below this parameter.
const MIN_SCORE_PARAM: &str = "min_score";

/// Pseudo-random values derived from a SHA-256 digest chain.
struct DigestStream {
    seed: [u8; 32],
    counter: u64,
}

impl DigestStream {
    fn new(analysis_type: AnalysisType, key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(analysis_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        Self {
            seed: hasher.finalize().into(),
            counter: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(self.counter.to_le_bytes());
        self.counter += 1;
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Uniform integer in `[low, high]`.
    fn range(&mut self, low: u64, high: u64) -> u64 {
        low + self.next_u64() % (high - low + 1)
    }

    /// Uniform float in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.next_u64() as usize % items.len()]
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn newick_label(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '(' | ')' | ',' | ':' | ';' | '[' | ']' | '\'' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Deterministic analyzer for any [`AnalysisType`].
#[derive(Debug, Clone)]
pub struct SimulatedAnalyzer {
    analysis_type: AnalysisType,
    name: String,
    latency: Duration,
}

impl SimulatedAnalyzer {
    pub fn new(analysis_type: AnalysisType) -> Self {
        Self {
            analysis_type,
            name: format!("simulated-{}", analysis_type.as_str()),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long in every `process` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn annotate(
        &self,
        dataset: &DatasetRecord,
        stream: &mut DigestStream,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError> {
        let genes = stream.range(3000, 3999);
        let proteins = genes * 85 / 100;

        let gff = format!(
            "##gff-version 3\n# Annotation of {}\n# Gene count: {}\n# Generated at: {}\n",
            dataset.name,
            genes,
            Utc::now().to_rfc3339()
        );
        let path = output
            .write(&format!("{}_annotation.gff", dataset.artifact_stem()), gff)
            .await?;

        Ok(ItemOutput::new(Finding::Annotation {
            genes_predicted: genes,
            proteins_annotated: proteins,
        })
        .with_artifact(path))
    }

    async fn type_sequence(
        &self,
        dataset: &DatasetRecord,
        stream: &mut DigestStream,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError> {
        let sequence_type = stream.pick(&SEQUENCE_TYPES).to_string();
        let confidence = round_to(0.9 + stream.unit() * 0.1, 3);
        let alleles: Vec<AlleleCall> = MLST_LOCI
            .iter()
            .map(|locus| AlleleCall {
                locus: locus.to_string(),
                allele: stream.range(1, 20) as u32,
            })
            .collect();

        let profile = alleles
            .iter()
            .map(|a| format!("{}:{}", a.locus, a.allele))
            .collect::<Vec<_>>()
            .join(", ");
        let report = format!(
            "Sequence Type: {}\nGenerated at: {}\nAlleles: {}\n",
            sequence_type,
            Utc::now().to_rfc3339(),
            profile
        );
        let path = output
            .write(&format!("{}_mlst.txt", dataset.artifact_stem()), report)
            .await?;

        Ok(ItemOutput::new(Finding::SequenceType {
            sequence_type,
            confidence,
            alleles,
        })
        .with_artifact(path))
    }

    async fn screen_genes(
        &self,
        dataset: &DatasetRecord,
        params: &TaskParameters,
        stream: &mut DigestStream,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError> {
        let (panel, max_hits, label, suffix): (&[&str], u64, &str, &str) =
            match self.analysis_type {
                AnalysisType::VirulenceGenes => (&VIRULENCE_PANEL[..], 4, "Virulence", "virulence"),
                _ => (&RESISTANCE_PANEL[..], 3, "Resistance", "resistance"),
            };

        let min_score = match params.get(MIN_SCORE_PARAM) {
            None => 0.0,
            Some(value) => value.as_f64().ok_or_else(|| {
                AnalyzerError::Fatal(format!("parameter {MIN_SCORE_PARAM} must be a number"))
            })?,
        };

        let draws = stream.range(1, max_hits);
        let mut hits: Vec<GeneHit> = Vec::new();
        for _ in 0..draws {
            let name = stream.pick(panel);
            let score = round_to(0.8 + stream.unit() * 0.2, 3);
            if score >= min_score && !hits.iter().any(|h| h.name == name) {
                hits.push(GeneHit {
                    name: name.to_string(),
                    score,
                });
            }
        }

        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        let report = format!(
            "{} Genes Found: {}\nGenerated at: {}\nTotal genes: {}\n",
            label,
            names.join(", "),
            Utc::now().to_rfc3339(),
            hits.len()
        );
        let path = output
            .write(&format!("{}_{}.txt", dataset.artifact_stem(), suffix), report)
            .await?;

        Ok(ItemOutput::new(Finding::Genes(hits)).with_artifact(path))
    }
}

#[async_trait]
impl Analyzer for SimulatedAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    async fn process(
        &self,
        dataset: &DatasetRecord,
        params: &TaskParameters,
        output: &OutputArea,
    ) -> Result<ItemOutput, AnalyzerError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut stream = DigestStream::new(self.analysis_type, &dataset.id);
        match self.analysis_type {
            AnalysisType::Annotation => self.annotate(dataset, &mut stream, output).await,
            AnalysisType::SequenceTyping => self.type_sequence(dataset, &mut stream, output).await,
            AnalysisType::ResistanceGenes | AnalysisType::VirulenceGenes => {
                self.screen_genes(dataset, params, &mut stream, output).await
            }
            AnalysisType::Phylogeny => Ok(ItemOutput::new(Finding::Taxon {
                variable_sites: stream.range(200, 1200),
            })),
        }
    }

    async fn combine(
        &self,
        items: &[ProcessedItem],
        _params: &TaskParameters,
        output: &OutputArea,
    ) -> Result<Option<ItemOutput>, AnalyzerError> {
        if self.analysis_type != AnalysisType::Phylogeny {
            return Ok(None);
        }

        let key = items
            .iter()
            .map(|item| item.dataset.id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut stream = DigestStream::new(self.analysis_type, &key);

        let snp_count = 1000
            + items
                .iter()
                .map(|item| match item.finding {
                    Finding::Taxon { variable_sites } => variable_sites,
                    _ => 0,
                })
                .sum::<u64>()
                .min(5000);

        let taxa: Vec<String> = items.iter().map(|item| item.dataset.name.clone()).collect();
        let leaves: Vec<String> = taxa
            .iter()
            .map(|name| format!("{}:{:.4}", newick_label(name), stream.unit()))
            .collect();
        let newick = format!("({});\n", leaves.join(","));

        let tree_file = output.write("phylogeny.nwk", newick).await?;
        Ok(Some(
            ItemOutput::new(Finding::Tree {
                taxa,
                snp_count,
                tree_file: tree_file.clone(),
            })
            .with_artifact(tree_file),
        ))
    }
}
