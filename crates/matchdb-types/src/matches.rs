//! Minimal identification-result record types.
//!
//! These carry only the fields the store and its consumers address records
//! by. Sequence matching, mass calculation, and spectrum annotation live in
//! the analysis layers, not here.

use serde::{Deserialize, Serialize};

use crate::record::MatchRecord;

/// A spectrum-to-peptide match, keyed by spectrum title.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMatch {
    /// Title of the matched spectrum (the string key).
    pub title: String,
    /// Sequence of the best-scoring peptide assumption, if any.
    pub best_sequence: Option<String>,
    /// Score of the best assumption.
    pub score: f64,
    /// Assumed precursor charge.
    pub charge: i32,
}

impl MatchRecord for SpectrumMatch {
    const TAG: &'static str = "spectrum_match";

    fn key(&self) -> &str {
        &self.title
    }
}

/// A peptide-level match aggregating spectrum evidence, keyed by sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideMatch {
    /// The peptide sequence (the string key).
    pub sequence: String,
    /// Number of spectra supporting this peptide.
    pub spectrum_count: u32,
    /// Aggregated confidence in [0, 1].
    pub confidence: f64,
}

impl MatchRecord for PeptideMatch {
    const TAG: &'static str = "peptide_match";

    fn key(&self) -> &str {
        &self.sequence
    }
}

/// A protein-level match, keyed by accession.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProteinMatch {
    /// Protein accession (the string key).
    pub accession: String,
    /// String keys of the peptide matches mapped to this protein.
    pub peptide_keys: Vec<String>,
    /// Whether the accession comes from the decoy database.
    pub decoy: bool,
}

impl MatchRecord for ProteinMatch {
    const TAG: &'static str = "protein_match";

    fn key(&self) -> &str {
        &self.accession
    }
}

/// A raw spectrum, keyed by title.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Spectrum title (the string key).
    pub title: String,
    /// Precursor mass-over-charge.
    pub precursor_mz: f64,
    /// Precursor charge.
    pub precursor_charge: i32,
    /// (m/z, intensity) peak list.
    pub peaks: Vec<(f64, f64)>,
}

impl MatchRecord for Spectrum {
    const TAG: &'static str = "spectrum";

    fn key(&self) -> &str {
        &self.title
    }
}
