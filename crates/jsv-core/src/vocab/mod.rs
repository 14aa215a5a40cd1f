//! Keywords every [`Validator`](crate::Validator) starts with.
//!
//! They are plain [`KeywordDefinition::code`] keywords and compile through the same
//! dispatcher as user keywords.

mod applicator;
mod validation;

use crate::definition::KeywordDefinition;

/// The built-in keywords in evaluation order.
pub(crate) fn keywords() -> Vec<(&'static str, KeywordDefinition)> {
    let mut keywords = validation::keywords();
    keywords.extend(applicator::keywords());
    keywords
}
