use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, Result};
use crate::io::{cache_path, read_lines};
use super::context::{Context, Token};
use super::frequency_table::FrequencyTable;

/// Backoff frequency model over variable-length contexts.
///
/// The `MarkovModel` maps every context of length 0..n observed during
/// training to the counts of tokens that followed it. Training records a
/// token under *every* suffix of the rolling context, so whenever a long
/// context is present, each of its shorter suffixes is present too; this
/// is what lets a generator back off to shorter contexts on a miss.
///
/// # Responsibilities
/// - Build the model from token streams, incrementally across calls
/// - Merge with another model of the same order (parallel construction)
/// - Serialize to and from the compact on-disk format
///
/// # Invariants
/// - `n` is always >= 1
/// - For every stored context, its table total equals the sum of its counts
/// - Every suffix of a stored context observed in the same pass is stored
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MarkovModel {
	/// Maximum context length tracked by the model.
	n: usize,

	/// Mapping from a context (0..n prior tokens) to its continuation counts.
	contexts: HashMap<Context, FrequencyTable>,

	/// Token interner, a memory optimization only. Never serialized;
	/// re-seeded from the tables when a model is adopted from disk.
	#[serde(skip)]
	interner: HashSet<Token>,
}

impl MarkovModel {
	/// Creates a new empty model of order `n`.
	///
	/// # Errors
	/// Returns an error if `n < 1`.
	pub fn new(n: usize) -> Result<Self> {
		if n < 1 {
			return Err(ModelError::InvalidOrder(n));
		}
		Ok(Self { n, contexts: HashMap::new(), interner: HashSet::new() })
	}

	/// Maximum context length tracked by the model.
	pub fn order(&self) -> usize {
		self.n
	}

	/// Number of distinct contexts observed so far.
	pub fn context_count(&self) -> usize {
		self.contexts.len()
	}

	/// Continuation counts for `context`, if it was observed in training.
	pub fn frequency(&self, context: &Context) -> Option<&FrequencyTable> {
		self.contexts.get(context)
	}

	/// Iterates over every stored `(context, table)` pair.
	pub fn contexts(&self) -> impl Iterator<Item = (&Context, &FrequencyTable)> {
		self.contexts.iter()
	}

	/// Feeds a token sequence into the model.
	///
	/// Maintains a rolling context of up to `n` prior tokens, starting
	/// empty, and records each incoming token under every suffix of it.
	/// Repeated calls merge counts; this is the intended way to add more
	/// corpus data incrementally.
	pub fn train<I, S>(&mut self, tokens: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut prev = Context::empty();
		for raw in tokens {
			let token = self.intern(raw.as_ref());

			// Record under every suffix, including the empty context,
			// so backoff always has a shorter context to land on.
			for suffix in prev.suffixes() {
				let table = self.contexts.entry(suffix).or_default();
				table.record(token.clone());
			}

			prev.push(token, self.n);
		}
	}

	/// Merges another model into this one.
	///
	/// Occurrence counts for matching contexts and tokens are summed.
	///
	/// # Errors
	/// Returns an error if the model orders do not match.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.n != other.n {
			return Err(ModelError::OrderMismatch { expected: self.n, found: other.n });
		}

		for (context, table) in &other.contexts {
			if let Some(existing) = self.contexts.get_mut(context) {
				existing.merge(table);
			} else {
				self.contexts.insert(context.clone(), table.clone());
			}
		}

		Ok(())
	}

	/// Serializes `(order, contexts)` to the compact binary format.
	///
	/// # Errors
	/// Reports a `Save` error if encoding fails; the model is unaffected.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		postcard::to_stdvec(self).map_err(|e| ModelError::Save(e.to_string()))
	}

	/// Deserializes a model from the compact binary format.
	///
	/// # Errors
	/// Reports a `Load` error if the bytes are not a valid serialized model.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		postcard::from_bytes(bytes).map_err(|e| ModelError::Load(e.to_string()))
	}

	/// Writes the serialized model to `filepath`.
	///
	/// # Errors
	/// Reports a `Save` error on write failure; the in-memory model is
	/// unaffected.
	pub fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
		let bytes = self.to_bytes()?;
		std::fs::write(filepath.as_ref(), bytes).map_err(|e| ModelError::Save(e.to_string()))
	}

	/// Replaces this model's data with a model loaded from `filepath`.
	///
	/// If the stored order is smaller than the configured one, the stored
	/// order is authoritative: the configured order is lowered and a
	/// warning is logged. A larger stored order leaves the configured
	/// order in place; the longer contexts are simply never queried.
	///
	/// # Errors
	/// Reports a `Load` error on read or decode failure; no partial state
	/// is adopted.
	pub fn load<P: AsRef<Path>>(&mut self, filepath: P) -> Result<()> {
		let bytes = std::fs::read(filepath.as_ref()).map_err(|e| ModelError::Load(e.to_string()))?;
		let loaded = Self::from_bytes(&bytes)?;
		self.adopt(loaded);
		Ok(())
	}

	/// Builds a model from a text corpus, one training pass per line.
	///
	/// # Behavior
	/// - If a sibling `.bin` cache exists, loads it instead of re-reading
	///   the corpus (order downgrade rules of `load` apply).
	/// - Otherwise splits the corpus lines into chunks, builds partial
	///   models on threads (lines are whitespace-tokenized and trained
	///   independently), merges them, and writes the `.bin` cache for
	///   future fast loading.
	pub fn from_corpus_file<P: AsRef<Path>>(filepath: P, n: usize) -> Result<Self> {
		let mut model = Self::new(n)?;

		let binary_data_path = cache_path(&filepath).map_err(|e| ModelError::Load(e.to_string()))?;
		if binary_data_path.exists() {
			let bytes = std::fs::read(&binary_data_path).map_err(|e| ModelError::Load(e.to_string()))?;
			model.adopt(Self::from_bytes(&bytes)?);
			return Ok(model);
		}

		let lines = read_lines(&filepath).map_err(|e| ModelError::Load(e.to_string()))?;
		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = ((lines.len() + chunks - 1) / chunks).max(1);

		let (tx, rx) = mpsc::channel();
		for chunk in lines.chunks(chunk_size) {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();

			thread::spawn(move || {
				let mut partial = Self { n, contexts: HashMap::new(), interner: HashSet::new() };
				for line in chunk {
					partial.train(line.split_whitespace());
				}
				tx.send(partial).expect("Failed to send from thread");
			});
		}
		drop(tx);

		for partial in rx.iter() {
			model.merge(&partial)?;
		}

		let bytes = model.to_bytes()?;
		std::fs::write(binary_data_path, bytes).map_err(|e| ModelError::Save(e.to_string()))?;

		Ok(model)
	}

	/// Adopts loaded data, lowering the configured order when the stored
	/// one is smaller.
	fn adopt(&mut self, loaded: Self) {
		if self.n > loaded.n {
			log::warn!("stored model order is {}, lowering configured order from {}", loaded.n, self.n);
			self.n = loaded.n;
		}
		self.contexts = loaded.contexts;

		// Re-seed the interner so further training reuses the loaded
		// allocations. Every trained token appears in at least one table.
		self.interner = self.contexts.values().flat_map(|table| table.tokens()).cloned().collect();
	}

	/// Canonicalizes a token so equal tokens share one allocation.
	fn intern(&mut self, raw: &str) -> Token {
		if let Some(token) = self.interner.get(raw) {
			return token.clone();
		}
		let token = Token::from(raw);
		self.interner.insert(token.clone());
		token
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn ctx(tokens: &[&str]) -> Context {
		Context::from_tokens(tokens.iter().map(|t| Token::from(*t)).collect())
	}

	const SPEC_TOKENS: [&str; 8] = ["the", "cat", "sat", ".", "the", "dog", "sat", "."];

	#[test]
	fn order_must_be_positive() {
		assert_eq!(MarkovModel::new(0).unwrap_err(), ModelError::InvalidOrder(0));
		assert!(MarkovModel::new(1).is_ok());
	}

	#[test]
	fn training_records_every_suffix() {
		let mut model = MarkovModel::new(2).unwrap();
		model.train(SPEC_TOKENS);

		let sat = model.frequency(&ctx(&["sat"])).unwrap();
		assert_eq!(sat.total(), 2);
		assert_eq!(sat.count("."), 2);

		// Bigram context observed alongside its unigram suffix.
		assert!(model.frequency(&ctx(&["cat", "sat"])).is_some());
		assert!(model.frequency(&ctx(&["cat"])).is_some());
		assert!(model.frequency(&Context::empty()).is_some());
	}

	#[test]
	fn totals_equal_sum_of_counts() {
		let mut model = MarkovModel::new(3).unwrap();
		model.train(SPEC_TOKENS);
		model.train(["a", "b", "a", "c", "a", "b"]);

		for (_, table) in model.contexts() {
			let sum: u64 = table.counts().map(|(_, count)| count).sum();
			assert_eq!(table.total(), sum);
		}
	}

	#[test]
	fn suffix_closure_holds() {
		let mut model = MarkovModel::new(3).unwrap();
		model.train(SPEC_TOKENS);

		for (context, _) in model.contexts() {
			for suffix in context.suffixes() {
				assert!(
					model.frequency(&suffix).is_some(),
					"missing suffix {:?} of {:?}",
					suffix,
					context
				);
			}
		}
	}

	#[test]
	fn training_is_additive_within_segments() {
		let mut split = MarkovModel::new(2).unwrap();
		split.train(["x", "y"]);
		split.train(["z", "w"]);

		let mut joined = MarkovModel::new(2).unwrap();
		joined.train(["x", "y", "z", "w"]);

		// Contexts fully contained in either segment agree.
		for key in [ctx(&["x"]), ctx(&["z"]), Context::empty()] {
			assert_eq!(split.frequency(&key), joined.frequency(&key), "context {:?}", key);
		}

		// The cross-boundary context only exists in the joined pass.
		assert!(split.frequency(&ctx(&["y"])).is_none());
		assert!(joined.frequency(&ctx(&["y"])).is_some());
	}

	#[test]
	fn byte_round_trip_preserves_model() {
		let mut model = MarkovModel::new(2).unwrap();
		model.train(SPEC_TOKENS);

		let restored = MarkovModel::from_bytes(&model.to_bytes().unwrap()).unwrap();

		assert_eq!(restored.order(), model.order());
		let original: HashMap<&Context, &FrequencyTable> = model.contexts().collect();
		let loaded: HashMap<&Context, &FrequencyTable> = restored.contexts().collect();
		assert_eq!(original, loaded);
	}

	#[test]
	fn from_bytes_rejects_malformed_input() {
		match MarkovModel::from_bytes(&[]) {
			Err(ModelError::Load(_)) => (),
			other => panic!("expected a load error, got {:?}", other),
		}
	}

	#[test]
	fn load_downgrades_larger_configured_order() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bin");

		let mut stored = MarkovModel::new(2).unwrap();
		stored.train(SPEC_TOKENS);
		stored.save(&path).unwrap();

		let mut requested = MarkovModel::new(5).unwrap();
		requested.load(&path).unwrap();
		assert_eq!(requested.order(), 2);
		assert_eq!(requested.frequency(&ctx(&["sat"])).unwrap().total(), 2);

		// A smaller configured order is kept as-is.
		let mut smaller = MarkovModel::new(1).unwrap();
		smaller.load(&path).unwrap();
		assert_eq!(smaller.order(), 1);
	}

	#[test]
	fn merge_sums_counts_and_checks_order() {
		let mut left = MarkovModel::new(2).unwrap();
		left.train(["a", "b"]);
		let mut right = MarkovModel::new(2).unwrap();
		right.train(["a", "b"]);

		left.merge(&right).unwrap();
		assert_eq!(left.frequency(&ctx(&["a"])).unwrap().count("b"), 2);
		assert_eq!(left.frequency(&Context::empty()).unwrap().total(), 4);

		let other_order = MarkovModel::new(3).unwrap();
		assert_eq!(
			left.merge(&other_order).unwrap_err(),
			ModelError::OrderMismatch { expected: 2, found: 3 }
		);
	}

	#[test]
	fn corpus_file_build_writes_and_reuses_cache() {
		let dir = tempfile::tempdir().unwrap();
		let corpus = dir.path().join("corpus.txt");
		let mut file = std::fs::File::create(&corpus).unwrap();
		writeln!(file, "the cat sat .").unwrap();
		writeln!(file, "the dog sat .").unwrap();
		drop(file);

		let model = MarkovModel::from_corpus_file(&corpus, 2).unwrap();
		assert_eq!(model.frequency(&ctx(&["sat"])).unwrap().count("."), 2);
		assert!(dir.path().join("corpus.bin").exists());

		// Second build goes through the cache and sees the same data.
		let cached = MarkovModel::from_corpus_file(&corpus, 2).unwrap();
		assert_eq!(cached.frequency(&ctx(&["sat"])), model.frequency(&ctx(&["sat"])));
		assert_eq!(cached.context_count(), model.context_count());
	}
}
