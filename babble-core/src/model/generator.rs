use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{ModelError, Result};
use super::context::{Context, Token};
use super::frequency_table::FrequencyTable;
use super::markov_model::MarkovModel;

/// Token-final characters that close a clause.
///
/// Context memory is deliberately shortened when one of these is
/// generated, to reduce verbatim repetition across clause boundaries.
pub const CLAUSE_ENDS: [char; 4] = [',', '.', ';', ':'];

/// Number of weighted draws used to build one manual-mode candidate set.
const MANUAL_DRAWS: usize = 50;

/// Boundary interface for manual generation mode.
///
/// The generator hands over an ordered candidate set and expects an
/// integer choice back: 0 asks for a fresh candidate set, 1..=K selects
/// candidate K. The medium (terminal, network, test double) is up to the
/// implementor, as is re-prompting a human on unparseable input.
pub trait ManualSelector {
	fn present_choices(&mut self, candidates: &[Token]) -> usize;
}

/// Infinite, restartable token producer over a trained `MarkovModel`.
///
/// Holds a live context, a reset probability, a clause-truncation length
/// and a per-context visit counter. Each step samples the next token from
/// the model given the current context, backing off to the unconditional
/// distribution when the context was never observed.
///
/// # Responsibilities
/// - Produce tokens forever, restartable via `reset`
/// - Back off to the empty context on a miss
/// - Shorten context memory at clause boundaries
/// - Detect saturation of the current context
///
/// # Notes
/// - The model is borrowed read-only; several generators can share one.
/// - The random source is generator-owned and replaced on every `reset`,
///   so a seed fully determines the produced sequence.
pub struct Generator<'a> {
	model: &'a MarkovModel,
	rng: StdRng,

	/// Probability of drawing from the unconditional distribution at each step.
	p: f64,

	/// Most recent tokens, capped at the model order.
	context: Context,

	/// Context length kept after a clause-end token.
	cln: usize,

	manual: bool,
	selector: Option<Box<dyn ManualSelector>>,

	/// Visits per context this session, for saturation detection.
	recent: HashMap<Context, u64>,
}

impl<'a> Generator<'a> {
	/// Creates a generator over `model` with neutral settings: seed 0,
	/// no unconditional restarts, empty context, cln = n, manual off.
	pub fn new(model: &'a MarkovModel) -> Self {
		Self {
			model,
			rng: StdRng::seed_from_u64(0),
			p: 0.0,
			context: Context::empty(),
			cln: model.order(),
			manual: false,
			selector: None,
			recent: HashMap::new(),
		}
	}

	/// Reconfigures the generator for a fresh run.
	///
	/// Reseeds the random source, sets the reset probability, installs
	/// the initial context (normally empty), clamps `cln`, clears the
	/// recent-data counters and sets the manual flag.
	///
	/// # Errors
	/// Returns an error if `p` is outside [0.0, 1.0].
	pub fn reset(&mut self, seed: u64, p: f64, initial: Context, cln: Option<usize>, manual: bool) -> Result<()> {
		if !(0.0..=1.0).contains(&p) {
			return Err(ModelError::InvalidProbability(p));
		}
		self.rng = StdRng::seed_from_u64(seed);
		self.p = p;
		self.context = initial;
		self.set_cln(cln);
		self.manual = manual;
		self.clear_recent_data();
		Ok(())
	}

	/// Sets the clause-truncation length.
	///
	/// Values outside [1, n] (and `None`) fall back to the model order.
	pub fn set_cln(&mut self, cln: Option<usize>) {
		let n = self.model.order();
		self.cln = match cln {
			Some(c) if (1..=n).contains(&c) => c,
			_ => n,
		};
	}

	/// Switches manual mode on or off.
	pub fn set_manual(&mut self, manual: bool) {
		self.manual = manual;
	}

	/// Installs the collaborator consulted in manual mode.
	pub fn set_selector(&mut self, selector: Box<dyn ManualSelector>) {
		self.selector = Some(selector);
	}

	/// Forgets all per-context visit counts.
	pub fn clear_recent_data(&mut self) {
		self.recent.clear();
	}

	/// The context the next step will sample from.
	pub fn context(&self) -> &Context {
		&self.context
	}

	/// Produces the next token. The sequence never ends on its own.
	///
	/// 1. With probability `p` (or when the context is empty), draw from
	///    the unconditional distribution; the accumulated context is kept.
	/// 2. Otherwise draw from the current context; if it was never seen
	///    in training, clear the context and draw unconditionally.
	/// 3. Append the token, cap the context at the model order, and
	///    shorten it to `cln` tokens after a clause-end token.
	///
	/// # Errors
	/// `EmptyModel` if the model has no training data; `SelectorMissing`
	/// in manual mode without an installed selector.
	pub fn next_token(&mut self) -> Result<Token> {
		let token = if self.context.is_empty() || self.rng.random::<f64>() < self.p {
			self.select_token(&Context::empty())?.ok_or(ModelError::EmptyModel)?
		} else {
			let current = self.context.clone();
			match self.select_token(&current)? {
				Some(token) => token,
				None => {
					// Backoff target unseen in training: restart the
					// local context and draw unconditionally.
					self.context.clear();
					self.select_token(&Context::empty())?.ok_or(ModelError::EmptyModel)?
				}
			}
		};

		self.context.push(token.clone(), self.model.order());
		if ends_clause(&token) {
			self.context.keep_last(self.cln);
		}

		Ok(token)
	}

	/// Whether the current context has been sampled more often this
	/// session than it was observed during training.
	///
	/// Used as a signal that the generator is likely to start repeating
	/// itself and should be reset. False if the context was never visited
	/// this session; a visited context missing from the model counts as
	/// observed zero times.
	pub fn is_current_context_saturated(&self) -> bool {
		let Some(visits) = self.recent.get(&self.context) else {
			return false;
		};
		let observed = self.model.frequency(&self.context).map_or(0, FrequencyTable::total);
		*visits > observed
	}

	/// Samples one token from `context`, recording the visit.
	///
	/// Returns `Ok(None)` when the context (or its table) has nothing to
	/// offer, which callers treat as a backoff miss.
	fn select_token(&mut self, context: &Context) -> Result<Option<Token>> {
		*self.recent.entry(context.clone()).or_insert(0) += 1;

		let model = self.model;
		let Some(table) = model.frequency(context) else {
			return Ok(None);
		};

		if self.manual {
			self.manual_select(table)
		} else {
			Ok(table.choose(&mut self.rng))
		}
	}

	/// Runs the manual-selection loop against the installed selector.
	///
	/// Candidate sets are built from repeated weighted draws,
	/// deduplicated in draw order. A choice of 0 regenerates the set;
	/// an out-of-range choice is rejected and re-requested, never
	/// silently replaced by a default.
	fn manual_select(&mut self, table: &FrequencyTable) -> Result<Option<Token>> {
		let Some(selector) = self.selector.as_mut() else {
			return Err(ModelError::SelectorMissing);
		};

		loop {
			let mut candidates: Vec<Token> = Vec::new();
			for _ in 0..MANUAL_DRAWS {
				if let Some(token) = table.choose(&mut self.rng) {
					if !candidates.contains(&token) {
						candidates.push(token);
					}
				}
			}
			if candidates.is_empty() {
				return Ok(None);
			}

			loop {
				match selector.present_choices(&candidates) {
					0 => break,
					choice if choice <= candidates.len() => {
						return Ok(Some(candidates[choice - 1].clone()));
					}
					choice => {
						log::warn!("selection {} out of range [0-{}], asking again", choice, candidates.len());
					}
				}
			}
		}
	}
}

impl Iterator for Generator<'_> {
	type Item = Token;

	/// Endless iteration over generated tokens; an error ends the iterator.
	fn next(&mut self) -> Option<Token> {
		self.next_token().ok()
	}
}

/// Whether a token's final character closes a clause.
fn ends_clause(token: &str) -> bool {
	token.chars().last().is_some_and(|c| CLAUSE_ENDS.contains(&c))
}
