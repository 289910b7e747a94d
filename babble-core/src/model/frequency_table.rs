use std::collections::BTreeMap;

use rand::Rng;

use serde::{Deserialize, Serialize};

use super::context::Token;

/// Continuation counts observed for a single context.
///
/// A `FrequencyTable` stores how many times each token followed the owning
/// context during training. Conceptually, this is a node in a Markov chain
/// where outgoing edges are weighted by their number of observations.
///
/// ## Responsibilities
/// - Accumulate occurrences during training
/// - Pick the next token using weighted random sampling
/// - Merge with another table for the same context (parallel training support)
///
/// ## Invariants
/// - `total` always equals the sum of all per-token counts
/// - Each stored count is strictly positive
/// - The map is ordered, so a seeded draw replays identically across runs
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyTable {
	/// Total number of observations across all tokens.
	total: u64,
	/// Occurrence count per continuation token.
	/// Example: { "the" => 42, "a" => 3 }
	counts: BTreeMap<Token, u64>,
}

impl FrequencyTable {
	/// Total number of observations recorded in this table.
	pub fn total(&self) -> u64 {
		self.total
	}

	/// Occurrences recorded for `token`, 0 if absent.
	pub fn count(&self, token: &str) -> u64 {
		self.counts.get(token).copied().unwrap_or(0)
	}

	/// Iterates over `(token, count)` pairs in table order.
	pub fn counts(&self) -> impl Iterator<Item = (&Token, u64)> {
		self.counts.iter().map(|(token, count)| (token, *count))
	}

	/// Records one occurrence of `token`.
	///
	/// - If the token was already observed, its count is increased.
	/// - Otherwise, a new entry is created with an initial count of 1.
	pub fn record(&mut self, token: Token) {
		*self.counts.entry(token).or_insert(0) += 1;
		self.total += 1;
	}

	/// Picks a token using weighted random sampling.
	///
	/// The probability of selecting a token is proportional to its
	/// occurrence count. An empty table never yields a draw.
	///
	/// Returns `None` if the table has no observations.
	pub fn choose<R: Rng>(&self, rng: &mut R) -> Option<Token> {
		if self.total == 0 {
			return None;
		}

		// Walk the table, subtracting each bucket from the drawn index.
		let mut idx = rng.random_range(0..self.total);
		for (token, count) in &self.counts {
			if idx < *count {
				return Some(token.clone());
			}
			idx -= count;
		}

		// Unreachable while the total invariant holds.
		None
	}

	/// Merges another table into this one.
	///
	/// Occurrence counts and totals are summed. Intended for combining
	/// partial models built in parallel.
	pub fn merge(&mut self, other: &Self) {
		for (token, count) in &other.counts {
			*self.counts.entry(token.clone()).or_insert(0) += *count;
		}
		self.total += other.total;
	}

	/// Tokens present in this table.
	pub(crate) fn tokens(&self) -> impl Iterator<Item = &Token> {
		self.counts.keys()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn tok(s: &str) -> Token {
		Token::from(s)
	}

	#[test]
	fn record_maintains_total() {
		let mut table = FrequencyTable::default();
		table.record(tok("a"));
		table.record(tok("b"));
		table.record(tok("a"));

		assert_eq!(table.total(), 3);
		assert_eq!(table.count("a"), 2);
		assert_eq!(table.count("b"), 1);
		assert_eq!(table.count("c"), 0);

		let sum: u64 = table.counts().map(|(_, count)| count).sum();
		assert_eq!(table.total(), sum);
	}

	#[test]
	fn choose_from_empty_table_yields_nothing() {
		let table = FrequencyTable::default();
		let mut rng = StdRng::seed_from_u64(7);
		assert_eq!(table.choose(&mut rng), None);
	}

	#[test]
	fn choose_single_candidate_is_deterministic() {
		let mut table = FrequencyTable::default();
		table.record(tok("."));
		table.record(tok("."));

		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..100 {
			assert_eq!(table.choose(&mut rng), Some(tok(".")));
		}
	}

	#[test]
	fn choose_only_returns_present_tokens() {
		let mut table = FrequencyTable::default();
		table.record(tok("x"));
		table.record(tok("y"));
		table.record(tok("y"));
		table.record(tok("z"));

		let mut rng = StdRng::seed_from_u64(42);
		for _ in 0..500 {
			let drawn = table.choose(&mut rng).unwrap();
			assert!(table.count(&drawn) > 0);
		}
	}

	#[test]
	fn merge_sums_counts_and_totals() {
		let mut left = FrequencyTable::default();
		left.record(tok("a"));
		left.record(tok("b"));

		let mut right = FrequencyTable::default();
		right.record(tok("b"));
		right.record(tok("c"));

		left.merge(&right);

		assert_eq!(left.total(), 4);
		assert_eq!(left.count("a"), 1);
		assert_eq!(left.count("b"), 2);
		assert_eq!(left.count("c"), 1);
	}
}
