//! Page analysis: stock status and product thumbnail.

mod evaluator;
mod thumbnail;

pub use evaluator::{evaluate, EvaluationError, Evaluation};
pub use thumbnail::extract_thumbnail;
