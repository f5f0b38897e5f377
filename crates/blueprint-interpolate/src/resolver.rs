//! Resolver combinators.

use std::cell::RefCell;
use std::collections::HashMap;

/// A boxed fallback lookup, composable with [`chain`] and [`memoize`].
pub type Resolver<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Composes resolvers into one that tries each in order and returns the
/// first hit, or `None` when every resolver misses.
pub fn chain<'a>(resolvers: Vec<Resolver<'a>>) -> Resolver<'a> {
    Box::new(move |name| resolvers.iter().find_map(|resolver| resolver(name)))
}

/// Wraps a resolver with a single-instance cache keyed by the looked-up
/// name. Misses are cached too, so an expensive resolver is consulted at
/// most once per name. The cache lives exactly as long as the returned
/// wrapper; it is never shared between wrappers.
pub fn memoize<'a>(resolver: Resolver<'a>) -> Resolver<'a> {
    let cache: RefCell<HashMap<String, Option<String>>> = RefCell::new(HashMap::new());
    Box::new(move |name| {
        if let Some(hit) = cache.borrow().get(name) {
            return hit.clone();
        }
        let value = resolver(name);
        cache.borrow_mut().insert(name.to_string(), value.clone());
        value
    })
}
