//! The substitution engine.
//!
//! The scanner is index-based rather than regex-based: the escape rules and
//! innermost-first nesting cannot be expressed as a single regular pattern.
//! Each top-level call carries its own cycle set and (for map interpolation)
//! a memo of already-resolved keys.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::error::{InterpolationError, InterpolationResult};
use crate::{PostprocessorFn, ResolverFn};

const ESCAPE_CHAR: u8 = b'\\';
const DELIM_START: &str = "${";
const DELIM_STOP: &str = "}";

/// Placeholder for an unresolved expression while the scanner keeps
/// re-substituting; restored to `$` by the final unescape so the literal
/// text survives without being rescanned.
const MARKER: &str = "$__";

/// Substitutes every `${name}` occurrence in `text`, consulting `resolver`
/// for each name. Unresolvable names become the empty string when
/// `defaults_to_empty` is set and stay literal otherwise.
pub fn interpolate(
    text: &str,
    resolver: &ResolverFn<'_>,
    defaults_to_empty: bool,
) -> InterpolationResult<String> {
    interpolate_with(text, resolver, None, defaults_to_empty)
}

/// Like [`interpolate`], with a postprocessor applied to each resolved value.
pub fn interpolate_with(
    text: &str,
    resolver: &ResolverFn<'_>,
    postprocessor: Option<&PostprocessorFn<'_>>,
    defaults_to_empty: bool,
) -> InterpolationResult<String> {
    let subst = Subst {
        map: None,
        memo: RefCell::new(HashMap::new()),
        resolver,
        postprocessor,
        defaults_to_empty,
    };
    let mut cycle = HashSet::new();
    subst.subst_top(text, None, &mut cycle)
}

/// Resolves every value of `map` in place. Values may reference other keys
/// of the same map; those references are resolved against a snapshot of the
/// original entries, so the outcome does not depend on iteration or
/// insertion order. Names not present in the map fall through to `resolver`.
pub fn interpolate_map(
    map: &mut HashMap<String, String>,
    resolver: &ResolverFn<'_>,
    defaults_to_empty: bool,
) -> InterpolationResult<()> {
    interpolate_map_with(map, resolver, None, defaults_to_empty)
}

/// Like [`interpolate_map`], with a postprocessor applied to each resolved
/// value.
pub fn interpolate_map_with(
    map: &mut HashMap<String, String>,
    resolver: &ResolverFn<'_>,
    postprocessor: Option<&PostprocessorFn<'_>>,
    defaults_to_empty: bool,
) -> InterpolationResult<()> {
    let snapshot = map.clone();
    let subst = Subst {
        map: Some(&snapshot),
        memo: RefCell::new(HashMap::new()),
        resolver,
        postprocessor,
        defaults_to_empty,
    };
    for (name, value) in map.iter_mut() {
        let mut cycle = HashSet::new();
        *value = subst.subst_top(value, Some(name.as_str()), &mut cycle)?;
    }
    Ok(())
}

struct Subst<'a> {
    /// Snapshot of the map being interpolated; keys here take precedence
    /// over the resolver.
    map: Option<&'a HashMap<String, String>>,
    /// Per-call cache of fully resolved map keys.
    memo: RefCell<HashMap<String, String>>,
    resolver: &'a ResolverFn<'a>,
    postprocessor: Option<&'a PostprocessorFn<'a>>,
    defaults_to_empty: bool,
}

impl Subst<'_> {
    fn subst_top(
        &self,
        val: &str,
        current_key: Option<&str>,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<String> {
        Ok(unescape(&self.subst(val, current_key, cycle)?))
    }

    /// One substitution pass: find the innermost-leftmost `${...}` group,
    /// replace it, then rescan the result. `current_key` names the variable
    /// whose value this is, so self-references are caught by the cycle set.
    fn subst(
        &self,
        val: &str,
        current_key: Option<&str>,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<String> {
        if val.is_empty() {
            return Ok(String::new());
        }
        if let Some(key) = current_key {
            cycle.insert(key.to_string());
        }

        let result = self.subst_inner(val, current_key, cycle);

        if let Some(key) = current_key {
            cycle.remove(key);
        }
        result
    }

    fn subst_inner(
        &self,
        val: &str,
        current_key: Option<&str>,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<String> {
        let bytes = val.as_bytes();

        // Locate the first closing delimiter that is not escaped, then the
        // matching deepest-nested opening delimiter before it.
        let mut stop_delim: Option<usize> = None;
        let mut start_delim: Option<usize>;
        loop {
            let from = stop_delim.map(|i| i + 1).unwrap_or(0);
            stop_delim = find_from(val, DELIM_STOP, from);
            while let Some(sd) = stop_delim {
                if sd > 0 && bytes[sd - 1] == ESCAPE_CHAR {
                    stop_delim = find_from(val, DELIM_STOP, sd + 1);
                } else {
                    break;
                }
            }

            start_delim = find_from(val, DELIM_START, 0);
            if let (Some(mut start), Some(stop)) = (start_delim, stop_delim) {
                while let Some(idx) = find_from(val, DELIM_START, start + DELIM_START.len()) {
                    if idx > stop {
                        break;
                    }
                    start = idx;
                }
                start_delim = Some(start);
            }

            match (start_delim, stop_delim) {
                // The closing brace sits inside the opener; look further.
                (Some(start), Some(stop)) if stop < start + DELIM_START.len() => continue,
                _ => break,
            }
        }

        let (Some(start), Some(stop)) = (start_delim, stop_delim) else {
            return Ok(val.to_string());
        };

        let variable = &val[start + DELIM_START.len()..stop];
        let subst_value = self.process_substitution(variable, cycle)?;

        let mut next = String::with_capacity(val.len() + subst_value.len());
        next.push_str(&val[..start]);
        next.push_str(&subst_value);
        next.push_str(&val[stop + DELIM_STOP.len()..]);

        // The spliced value may expose further expressions.
        self.subst(&next, current_key, cycle)
    }

    /// Evaluates one brace group: the variable name possibly followed by a
    /// left-to-right chain of `:-` / `:+` operators.
    fn process_substitution(
        &self,
        variable: &str,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<String> {
        let mut start_idx = 0;
        let mut subst_value: Option<String> = None;
        let mut saw_operator = false;

        while start_idx < variable.len() {
            let idx = match (
                find_from(variable, ":-", start_idx),
                find_from(variable, ":+", start_idx),
            ) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            let Some(idx) = idx else {
                if subst_value.is_none() {
                    subst_value = self.resolve_variable(&variable[start_idx..], cycle)?;
                }
                break;
            };
            saw_operator = true;

            if subst_value.is_none() {
                subst_value = self.resolve_variable(&variable[start_idx..idx], cycle)?;
            }

            let next_idx = match (
                find_from(variable, ":-", idx + 2),
                find_from(variable, ":+", idx + 2),
            ) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            let op = &variable[idx..idx + 2];
            let op_value = &variable[idx + 2..next_idx.unwrap_or(variable.len())];
            // Operator branches are themselves subject to interpolation;
            // the full group text guards against re-entry.
            let processed = self.subst(op_value, Some(variable), cycle)?;

            match op {
                ":+" => {
                    if matches!(subst_value.as_deref(), Some(v) if !v.is_empty()) {
                        subst_value = Some(processed);
                    }
                }
                _ => {
                    if subst_value.as_deref().is_none_or(str::is_empty) {
                        subst_value = Some(processed);
                    }
                }
            }

            start_idx = next_idx.unwrap_or(variable.len());
        }

        Ok(match subst_value {
            Some(v) => v,
            // `${}` and an operator group whose name was undefined resolve
            // to the empty string rather than staying literal.
            None if variable.is_empty() || saw_operator => String::new(),
            None if self.defaults_to_empty => String::new(),
            None => format!("{MARKER}{{{variable}}}"),
        })
    }

    /// Resolves a bare variable name: own-map key first (recursively, with
    /// memoization), then the resolver chain. Returns `None` when nothing
    /// knows the name.
    fn resolve_variable(
        &self,
        variable: &str,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<Option<String>> {
        if !cycle.insert(variable.to_string()) {
            return Err(InterpolationError::RecursiveReference(variable.to_string()));
        }
        let resolved = self.resolve_variable_inner(variable, cycle);
        cycle.remove(variable);
        resolved
    }

    fn resolve_variable_inner(
        &self,
        variable: &str,
        cycle: &mut HashSet<String>,
    ) -> InterpolationResult<Option<String>> {
        if let Some(map) = self.map {
            if let Some(hit) = self.memo.borrow().get(variable) {
                return Ok(Some(hit.clone()));
            }
            if let Some(raw) = map.get(variable) {
                let resolved = self.subst(raw, Some(variable), cycle)?;
                self.memo
                    .borrow_mut()
                    .insert(variable.to_string(), resolved.clone());
                return Ok(Some(resolved));
            }
        }
        if !variable.is_empty() {
            if let Some(raw) = (self.resolver)(variable) {
                let resolved = self.subst(&raw, Some(variable), cycle)?;
                let resolved = match self.postprocessor {
                    Some(post) => post(variable, &resolved).unwrap_or(resolved),
                    None => resolved,
                };
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..].find(needle).map(|i| i + from)
}

/// Restores placeholder markers and strips escape backslashes in front of
/// braces and backslashes.
fn unescape(val: &str) -> String {
    if val.is_empty() {
        return String::new();
    }
    let val = val.replace(MARKER, "$");
    let bytes = val.as_bytes();
    let mut out = String::with_capacity(val.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESCAPE_CHAR && i + 1 < bytes.len() {
            let next = bytes[i + 1];
            if next == b'{' || next == b'}' || next == ESCAPE_CHAR {
                i += 1;
                continue;
            }
        }
        let ch = val[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none(_: &str) -> Option<String> {
        None
    }

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(interpolate("no variables here", &none, false).unwrap(), "no variables here");
    }

    #[test]
    fn test_simple_substitution() {
        let result = interpolate(
            "hello ${name}!",
            &|n| (n == "name").then(|| "world".to_string()),
            false,
        )
        .unwrap();
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_unresolved_left_literal() {
        assert_eq!(interpolate("x${miss}y", &none, false).unwrap(), "x${miss}y");
    }

    #[test]
    fn test_unresolved_defaults_to_empty() {
        assert_eq!(interpolate("x${miss}y", &none, true).unwrap(), "xy");
    }

    #[test]
    fn test_empty_name_is_empty_string() {
        assert_eq!(interpolate("a${}b", &none, false).unwrap(), "ab");
    }

    #[test]
    fn test_nested_expression_resolved_innermost_first() {
        let resolver = |n: &str| match n {
            "a" => Some("b".to_string()),
            "b" => Some("c".to_string()),
            _ => None,
        };
        assert_eq!(interpolate("${${a}}", &resolver, false).unwrap(), "c");
    }

    #[test]
    fn test_escaped_expression_left_literal() {
        let resolver = |n: &str| (n == "x").then(|| "BOOM".to_string());
        assert_eq!(interpolate(r"$\{x}", &resolver, false).unwrap(), "${x}");
    }

    #[test]
    fn test_malformed_syntax_left_literal() {
        assert_eq!(interpolate("${unterminated", &none, false).unwrap(), "${unterminated");
        assert_eq!(interpolate("stray } brace", &none, false).unwrap(), "stray } brace");
    }

    #[test]
    fn test_default_operator_table() {
        let resolver = |n: &str| match n {
            "set" => Some("value".to_string()),
            "empty" => Some(String::new()),
            _ => None,
        };
        assert_eq!(interpolate("${set:-fb}", &resolver, false).unwrap(), "value");
        assert_eq!(interpolate("${empty:-fb}", &resolver, false).unwrap(), "fb");
        assert_eq!(interpolate("${unset:-fb}", &resolver, false).unwrap(), "fb");
        assert_eq!(interpolate("${set:+alt}", &resolver, false).unwrap(), "alt");
        assert_eq!(interpolate("${empty:+alt}", &resolver, false).unwrap(), "");
        assert_eq!(interpolate("${unset:+alt}", &resolver, false).unwrap(), "");
    }

    #[test]
    fn test_default_value_is_interpolated() {
        let resolver = |n: &str| (n == "fb").then(|| "fallback".to_string());
        assert_eq!(interpolate("${unset:-${fb}}", &resolver, false).unwrap(), "fallback");
    }

    #[test]
    fn test_ternary_end_to_end() {
        let resolver = |n: &str| match n {
            "foo" => Some("-FOO".to_string()),
            "bar" => Some("-BAR".to_string()),
            _ => None,
        };
        let expr = "1.0${release:+${foo}:-${bar}}";
        assert_eq!(interpolate(expr, &resolver, false).unwrap(), "1.0-BAR");

        let with_release = |n: &str| match n {
            "release" => Some("true".to_string()),
            other => resolver(other),
        };
        assert_eq!(interpolate(expr, &with_release, false).unwrap(), "1.0-FOO");
    }

    #[test]
    fn test_cycle_through_resolver_fails() {
        let resolver = |n: &str| match n {
            "a" => Some("${b}".to_string()),
            "b" => Some("${a}".to_string()),
            _ => None,
        };
        let err = interpolate("${a}", &resolver, false).unwrap_err();
        assert_eq!(err, InterpolationError::RecursiveReference("a".to_string()));
    }

    #[test]
    fn test_map_key_self_reference_fails() {
        let mut map = props(&[("a", "${a}")]);
        let err = interpolate_map(&mut map, &none, false).unwrap_err();
        assert_eq!(err, InterpolationError::RecursiveReference("a".to_string()));
    }

    #[test]
    fn test_map_values_reference_other_keys() {
        let mut map = props(&[("root", "/opt"), ("lib", "${root}/lib"), ("bin", "${root}/bin")]);
        interpolate_map(&mut map, &none, false).unwrap();
        assert_eq!(map["lib"], "/opt/lib");
        assert_eq!(map["bin"], "/opt/bin");
    }

    #[test]
    fn test_map_order_independence() {
        // Same pairs, inserted in opposite orders.
        let entries: [(&str, &str); 3] = [("a", r"$\{var}"), ("ab", "${a}b"), ("abc", "${ab}c")];
        let mut forward = HashMap::new();
        for (k, v) in entries {
            forward.insert(k.to_string(), v.to_string());
        }
        let mut backward = HashMap::new();
        for (k, v) in entries.iter().rev() {
            backward.insert(k.to_string(), v.to_string());
        }

        interpolate_map(&mut forward, &none, false).unwrap();
        interpolate_map(&mut backward, &none, false).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward["a"], "${var}");
        assert_eq!(forward["ab"], "${var}b");
        assert_eq!(forward["abc"], "${var}bc");
    }

    #[test]
    fn test_map_interpolation_is_idempotent() {
        let mut map = props(&[("root", "/opt"), ("lib", "${root}/lib")]);
        interpolate_map(&mut map, &none, false).unwrap();
        let resolved = map.clone();
        interpolate_map(&mut map, &none, false).unwrap();
        assert_eq!(map, resolved);
    }

    #[test]
    fn test_map_falls_through_to_resolver() {
        let mut map = props(&[("home", "${env_home}/me")]);
        let resolver = |n: &str| (n == "env_home").then(|| "/home".to_string());
        interpolate_map(&mut map, &resolver, false).unwrap();
        assert_eq!(map["home"], "/home/me");
    }

    #[test]
    fn test_postprocessor_rewrites_value() {
        let post = |name: &str, value: &str| {
            (name == "url").then(|| format!("{value}/"))
        };
        let resolver = |n: &str| (n == "url").then(|| "http://example.org".to_string());
        let result = interpolate_with("${url}", &resolver, Some(&post), false).unwrap();
        assert_eq!(result, "http://example.org/");
    }

    #[test]
    fn test_multiple_occurrences() {
        let resolver = |n: &str| (n == "v").then(|| "1".to_string());
        assert_eq!(interpolate("${v}.${v}.${v}", &resolver, false).unwrap(), "1.1.1");
    }
}
