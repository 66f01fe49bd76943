//! Candidates and generations as the evolution server reports them.
//!
//! Field names follow the server's JSON (`candidateList`, `species`,
//! `rawScore`, ...). Both types are immutable once received.

use serde::{Deserialize, Serialize};

use crate::types::GenerationNumber;

/// One evaluated compound within a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: u64,
    /// Species label. The full set of species is not known up front.
    #[serde(rename = "species")]
    pub category: String,
    pub raw_score: f64,
    pub ligand_efficiency: f64,
    pub ligand_lipophilicity_efficiency: f64,
    /// Fitness used for selection. Older servers omit it.
    #[serde(default)]
    pub fitness: Option<f64>,
    #[serde(default)]
    pub smiles: String,
    #[serde(default)]
    pub iupac_name: String,
    /// RMSD of the common substructure to the anchor fragment.
    #[serde(default)]
    pub rmsd: Option<f64>,
}

/// One iteration's worth of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub number: GenerationNumber,
    #[serde(rename = "candidateList", default)]
    pub candidates: Vec<Candidate>,
}

impl Generation {
    pub fn new(number: GenerationNumber, candidates: Vec<Candidate>) -> Self {
        Self { number, candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The candidate with the highest fitness.
    ///
    /// Candidates without a fitness value rank below every scored one.
    pub fn fittest(&self) -> Option<&Candidate> {
        self.candidates.iter().max_by(|a, b| {
            let a = a.fitness.unwrap_or(f64::NEG_INFINITY);
            let b = b.fitness.unwrap_or(f64::NEG_INFINITY);
            a.total_cmp(&b)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, fitness: Option<f64>) -> Candidate {
        Candidate {
            id,
            category: "0".into(),
            raw_score: -7.5,
            ligand_efficiency: 0.3,
            ligand_lipophilicity_efficiency: 2.1,
            fitness,
            smiles: String::new(),
            iupac_name: String::new(),
            rmsd: None,
        }
    }

    #[test]
    fn parses_server_generation() {
        let json = r#"{
            "number": 4,
            "fittestCandidate": {"id": 12},
            "candidateList": [{
                "id": 12,
                "smiles": "CCO",
                "iupacName": "ethanol",
                "rawScore": -6.2,
                "ligandEfficiency": 0.41,
                "ligandLipophilicityEfficiency": 3.3,
                "rmsd": 0.8,
                "species": "2"
            }]
        }"#;
        let generation: Generation = serde_json::from_str(json).unwrap();
        assert_eq!(generation.number, 4);
        assert_eq!(generation.candidates.len(), 1);
        let c = &generation.candidates[0];
        assert_eq!(c.category, "2");
        assert_eq!(c.iupac_name, "ethanol");
        assert_eq!(c.rmsd, Some(0.8));
        assert!(c.fitness.is_none());
    }

    #[test]
    fn missing_candidate_list_is_empty() {
        let generation: Generation = serde_json::from_str(r#"{"number": 0}"#).unwrap();
        assert!(generation.is_empty());
        assert!(generation.fittest().is_none());
    }

    #[test]
    fn fittest_prefers_highest_fitness() {
        let generation = Generation::new(
            1,
            vec![
                candidate(1, Some(0.2)),
                candidate(2, None),
                candidate(3, Some(0.9)),
                candidate(4, Some(0.5)),
            ],
        );
        assert_eq!(generation.fittest().map(|c| c.id), Some(3));
    }
}
