//! Incremental aggregate views over the generations of a run.
//!
//! Two independent views feed the live charts:
//!
//! - [`ScoreView`]: one record per generation holding the raw score and
//!   the two efficiency metrics of every candidate in that generation,
//!   for a distribution-over-time plot.
//! - [`CategoryCountView`]: one record per generation counting candidates
//!   per species. The species set is discovered from the data.
//!
//! Each view is fed exactly once per newly stored generation and never
//! re-scans earlier generations.

use std::collections::HashMap;

use serde::Serialize;

use crate::candidate::Generation;
use crate::types::GenerationNumber;

/// Ligand efficiency is plotted ten-fold so it shares the raw score axis.
pub const LIGAND_EFFICIENCY_SCALE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Score view
// ---------------------------------------------------------------------------

/// Score distribution of a single generation.
///
/// The three arrays are parallel: index `i` in each belongs to the same
/// candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub generation: GenerationNumber,
    pub raw_scores: Vec<f64>,
    pub ligand_efficiencies: Vec<f64>,
    pub lipophilic_efficiencies: Vec<f64>,
}

impl ScoreRecord {
    fn from_generation(generation: &Generation) -> Self {
        let candidates = &generation.candidates;
        Self {
            generation: generation.number,
            raw_scores: candidates.iter().map(|c| c.raw_score).collect(),
            ligand_efficiencies: candidates
                .iter()
                .map(|c| c.ligand_efficiency * LIGAND_EFFICIENCY_SCALE)
                .collect(),
            lipophilic_efficiencies: candidates
                .iter()
                .map(|c| c.ligand_lipophilicity_efficiency)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreView {
    records: Vec<ScoreRecord>,
}

impl ScoreView {
    pub fn append(&mut self, generation: &Generation) {
        self.records.push(ScoreRecord::from_generation(generation));
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Category-count view
// ---------------------------------------------------------------------------

/// Candidate counts of one generation, aligned with
/// [`CategoryCountView::categories`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub generation: GenerationNumber,
    pub counts: Vec<u32>,
}

/// Per-generation species counts over a lazily discovered species set.
///
/// The set is established from the first generation that has candidates
/// (deduplicated, sorted) and keeps that order. A species first seen later
/// is appended to the set, and every earlier record gets a zero count for
/// it, so all records always have one count per known species.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryCountView {
    categories: Vec<String>,
    records: Vec<CategoryCounts>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CategoryCountView {
    pub fn append(&mut self, generation: &Generation) {
        self.discover(generation);

        let mut counts = vec![0u32; self.categories.len()];
        for candidate in &generation.candidates {
            if let Some(&slot) = self.index.get(&candidate.category) {
                counts[slot] += 1;
            }
        }
        self.records.push(CategoryCounts {
            generation: generation.number,
            counts,
        });
    }

    /// Extend the species set with anything `generation` introduces and
    /// backfill earlier records.
    fn discover(&mut self, generation: &Generation) {
        let mut unseen: Vec<&str> = generation
            .candidates
            .iter()
            .map(|c| c.category.as_str())
            .filter(|category| !self.index.contains_key(*category))
            .collect();
        if unseen.is_empty() {
            return;
        }
        unseen.sort_unstable();
        unseen.dedup();

        for category in unseen {
            self.index.insert(category.to_owned(), self.categories.len());
            self.categories.push(category.to_owned());
        }
        let width = self.categories.len();
        for record in &mut self.records {
            record.counts.resize(width, 0);
        }
    }

    /// Known species, in column order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn records(&self) -> &[CategoryCounts] {
        &self.records
    }

    /// Count of `category` in `generation`, if both are known.
    pub fn count(&self, generation: GenerationNumber, category: &str) -> Option<u32> {
        let slot = *self.index.get(category)?;
        self.records
            .iter()
            .find(|record| record.generation == generation)
            .map(|record| record.counts[slot])
    }

    pub fn is_established(&self) -> bool {
        !self.categories.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Both aggregate views, fed together.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateTracker {
    scores: ScoreView,
    categories: CategoryCountView,
}

impl AggregateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one newly stored generation into both views.
    pub fn append(&mut self, generation: &Generation) {
        self.scores.append(generation);
        self.categories.append(generation);
    }

    pub fn scores(&self) -> &ScoreView {
        &self.scores
    }

    pub fn category_counts(&self) -> &CategoryCountView {
        &self.categories
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;

    fn candidate(category: &str, raw_score: f64) -> Candidate {
        Candidate {
            id: 0,
            category: category.into(),
            raw_score,
            ligand_efficiency: 0.25,
            ligand_lipophilicity_efficiency: 1.5,
            fitness: None,
            smiles: String::new(),
            iupac_name: String::new(),
            rmsd: None,
        }
    }

    fn generation(number: GenerationNumber, categories: &[&str]) -> Generation {
        Generation::new(
            number,
            categories.iter().map(|c| candidate(c, -(number as f64))).collect(),
        )
    }

    #[test]
    fn score_records_are_per_generation() {
        let mut tracker = AggregateTracker::new();
        tracker.append(&generation(0, &["A", "B"]));
        tracker.append(&generation(1, &["A", "A", "B"]));

        let records = tracker.scores().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].generation, 0);
        assert_eq!(records[0].raw_scores.len(), 2);
        assert_eq!(records[1].raw_scores, vec![-1.0, -1.0, -1.0]);
        assert_eq!(records[1].ligand_efficiencies, vec![2.5, 2.5, 2.5]);
        assert_eq!(records[1].lipophilic_efficiencies, vec![1.5, 1.5, 1.5]);
    }

    #[test]
    fn categories_established_sorted_and_deduplicated() {
        let mut view = CategoryCountView::default();
        view.append(&generation(0, &["B", "A", "B"]));

        assert_eq!(view.categories(), &["A".to_string(), "B".to_string()]);
        assert_eq!(view.records()[0].counts, vec![1, 2]);
    }

    #[test]
    fn new_category_is_backfilled_with_zero() {
        let mut view = CategoryCountView::default();
        view.append(&generation(0, &["A", "B"]));
        view.append(&generation(1, &["C", "A"]));

        assert_eq!(view.categories(), &["A", "B", "C"].map(String::from));
        assert_eq!(view.count(0, "C"), Some(0));
        assert_eq!(view.records()[0].counts, vec![1, 1, 0]);
        assert_eq!(view.records()[1].counts, vec![1, 0, 1]);
    }

    #[test]
    fn empty_generations_before_establishment_are_widened() {
        let mut view = CategoryCountView::default();
        view.append(&generation(0, &[]));
        assert!(!view.is_established());
        assert!(view.records()[0].counts.is_empty());

        view.append(&generation(1, &["X"]));
        assert!(view.is_established());
        assert_eq!(view.records()[0].counts, vec![0]);
        assert_eq!(view.records()[1].counts, vec![1]);
    }

    #[test]
    fn established_order_is_stable() {
        let mut view = CategoryCountView::default();
        view.append(&generation(0, &["M", "N"]));
        view.append(&generation(1, &["A"]));

        // "A" sorts first but joins the set after the established columns.
        assert_eq!(view.categories(), &["M", "N", "A"].map(String::from));
    }

    #[test]
    fn count_for_unknown_category_or_generation_is_none() {
        let mut view = CategoryCountView::default();
        view.append(&generation(0, &["A"]));
        assert_eq!(view.count(0, "Z"), None);
        assert_eq!(view.count(5, "A"), None);
    }

    #[test]
    fn reset_forgets_categories() {
        let mut tracker = AggregateTracker::new();
        tracker.append(&generation(0, &["A"]));
        tracker.reset();

        assert!(tracker.scores().is_empty());
        assert!(!tracker.category_counts().is_established());
        assert!(tracker.category_counts().records().is_empty());
    }
}
