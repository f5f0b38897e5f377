//! Recursive `${...}` variable substitution.
//!
//! Supports:
//! - Nested expressions, resolved innermost-first (`${${a}}`)
//! - Escaping: `$\{name}` renders as the literal `${name}` without lookup
//! - Default and presence operators: `${name:-fallback}`, `${name:+alt}`,
//!   and the combined `${name:+ifSet:-ifUnset}` ternary
//! - In-place map interpolation where values reference other keys of the
//!   same map, with results independent of insertion order
//! - Cycle detection: a variable that transitively references itself fails
//!   with [`InterpolationError::RecursiveReference`]
//!
//! Malformed syntax (an unterminated `${` or a stray `}`) is never an error;
//! it degrades to literal text. The engine is stateless: every call owns its
//! cycle set and memo, so concurrent builds cannot observe each other.

pub mod engine;
pub mod error;
pub mod resolver;

pub use engine::{interpolate, interpolate_map, interpolate_map_with, interpolate_with};
pub use error::{InterpolationError, InterpolationResult};
pub use resolver::{Resolver, chain, memoize};

/// Fallback lookup consulted for names the current scope does not define.
/// Returns `None` when the name is unknown to this resolver.
pub type ResolverFn<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Hook applied to each resolved value, keyed by the variable name. Returns
/// `None` to keep the resolved value unchanged.
pub type PostprocessorFn<'a> = dyn Fn(&str, &str) -> Option<String> + 'a;
