//! Append-only ledger of the generations received for one run.
//!
//! Progress polls hand over incremental buffers, and a poll retried after
//! an ambiguous network failure may deliver a buffer that was already
//! applied. [`GenerationStore::append`] therefore skips any generation
//! number it has seen. Nothing is removed or mutated once stored; only
//! [`GenerationStore::reset`] (new submission) clears the ledger.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::candidate::Generation;
use crate::types::GenerationNumber;

#[derive(Debug, Clone, Default)]
pub struct GenerationStore {
    generations: BTreeMap<GenerationNumber, Generation>,
    /// Generation numbers in the order they were first received.
    arrival: Vec<GenerationNumber>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a buffer of generations, in order.
    ///
    /// Returns the numbers that were actually inserted; re-delivered
    /// generations are left out.
    pub fn append<I>(&mut self, generations: I) -> Vec<GenerationNumber>
    where
        I: IntoIterator<Item = Generation>,
    {
        let mut inserted = Vec::new();
        for generation in generations {
            if let Entry::Vacant(slot) = self.generations.entry(generation.number) {
                self.arrival.push(generation.number);
                inserted.push(generation.number);
                slot.insert(generation);
            }
        }
        inserted
    }

    pub fn has(&self, number: GenerationNumber) -> bool {
        self.generations.contains_key(&number)
    }

    pub fn get(&self, number: GenerationNumber) -> Option<&Generation> {
        self.generations.get(&number)
    }

    /// All generations, ascending by generation number.
    pub fn ordered_generations(&self) -> impl DoubleEndedIterator<Item = &Generation> + '_ {
        self.generations.values()
    }

    /// The generation at `index` in ascending generation-number order.
    pub fn nth(&self, index: usize) -> Option<&Generation> {
        self.generations.values().nth(index)
    }

    /// Position of a generation in ascending generation-number order.
    pub fn position(&self, number: GenerationNumber) -> Option<usize> {
        self.has(number)
            .then(|| self.generations.range(..number).count())
    }

    /// The generation with the highest number.
    pub fn latest(&self) -> Option<&Generation> {
        self.generations.values().next_back()
    }

    /// Generation numbers in the order they were first received.
    pub fn arrival_order(&self) -> &[GenerationNumber] {
        &self.arrival
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn reset(&mut self) {
        self.generations.clear();
        self.arrival.clear();
    }
}
