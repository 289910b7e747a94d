use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An interned token: an opaque string unit compared by value.
///
/// Interning makes repeated occurrences of the same token share one
/// allocation across contexts and tables.
pub type Token = Arc<str>;

/// An ordered sequence of 0..n prior tokens, used as a lookup key into
/// the model.
///
/// The empty context always exists once any training occurred and holds
/// the unconditional distribution.
///
/// # Invariants
/// - Two contexts are equal iff their token sequences are equal, including length
/// - The length never exceeds the model order (maintained by `push`)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Context(Vec<Token>);

impl Context {
	/// Creates the empty context.
	pub fn empty() -> Self {
		Self(Vec::new())
	}

	/// Creates a context from an explicit token sequence.
	///
	/// Useful for seeding a generator with a starting context.
	pub fn from_tokens(tokens: Vec<Token>) -> Self {
		Self(tokens)
	}

	/// Number of tokens in the context.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Read-only view of the token sequence.
	pub fn tokens(&self) -> &[Token] {
		&self.0
	}

	/// Appends a token, dropping the oldest one once the context grows
	/// past `n` tokens.
	pub fn push(&mut self, token: Token, n: usize) {
		self.0.push(token);
		if self.0.len() > n {
			self.0.remove(0);
		}
	}

	/// Truncates the context to its most recent `count` tokens.
	pub fn keep_last(&mut self, count: usize) {
		let len = self.0.len();
		if count < len {
			self.0.drain(..len - count);
		}
	}

	/// Drops every token.
	pub fn clear(&mut self) {
		self.0.clear();
	}

	/// Iterates over every suffix of the context, from the full sequence
	/// down to the empty context.
	///
	/// Training records counts under each of these, which is what makes
	/// backoff to shorter contexts possible at generation time.
	pub fn suffixes(&self) -> impl Iterator<Item = Context> + '_ {
		(0..=self.0.len()).map(move |i| Context(self.0[i..].to_vec()))
	}
}
