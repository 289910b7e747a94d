//! Babble error types.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
	/// Generation was requested before any training occurred.
	EmptyModel,
	/// The requested model order is not usable.
	InvalidOrder(usize),
	/// The reset probability is outside [0.0, 1.0].
	InvalidProbability(f64),
	/// Two models with different orders cannot be merged.
	OrderMismatch { expected: usize, found: usize },
	/// Manual mode is active but no selector is installed.
	SelectorMissing,
	Load(String),
	Save(String),
}

impl fmt::Display for ModelError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::EmptyModel => write!(f, "model has no training data"),
			Self::InvalidOrder(n) => write!(f, "order must be >= 1, got {n}"),
			Self::InvalidProbability(p) => {
				write!(f, "reset probability must be between 0.0 and 1.0, got {p}")
			}
			Self::OrderMismatch { expected, found } => {
				write!(f, "order mismatch: expected {expected}, found {found}")
			}
			Self::SelectorMissing => write!(f, "manual mode requires a selector"),
			Self::Load(msg) => write!(f, "loading model failed: {msg}"),
			Self::Save(msg) => write!(f, "saving model failed: {msg}"),
		}
	}
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
