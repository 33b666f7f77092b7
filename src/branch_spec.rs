//! Branch specifier matching.
//!
//! A branch spec is one of:
//! - `:<regex>` - a regular expression that must match the whole reference name
//! - a literal reference name (`origin/master`, `refs/tags/v1`)
//! - a wildcard pattern where `*` stays inside one path segment and `**`
//!   crosses segments
//!
//! Unqualified names (no `/`, no `**`) also match under any remote, so
//! `master` matches `origin/master`, `refs/heads/master` and
//! `refs/remotes/origin/master`.
//!
//! Specs without `$VAR` references are compiled once, at construction.
//! Parameterized specs are expanded against the caller's environment and
//! compiled on each match.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// Prefix that marks a spec as a raw regular expression.
pub const REGEX_SENTINEL: char = ':';

/// Spec for the symbolic default-branch pointer of every remote.
pub const HEAD_SPEC: &str = "*/HEAD";

#[derive(Debug, Clone)]
enum Matcher {
    /// Empty spec.
    Never,
    Compiled(Regex),
    /// Contains variable references; compiled after expansion.
    Deferred,
}

/// A compiled branch specifier.
#[derive(Debug, Clone)]
pub struct BranchSpec {
    name: String,
    matcher: Matcher,
}

impl BranchSpec {
    /// Build a spec, compiling it eagerly unless it references variables.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim().to_string();
        let matcher = if name.is_empty() {
            Matcher::Never
        } else if has_var_reference(&name) {
            Matcher::Deferred
        } else {
            Matcher::Compiled(compile(&name)?)
        };
        Ok(Self { name, matcher })
    }

    /// The spec matching `*/HEAD`.
    pub fn head() -> Self {
        Self {
            name: HEAD_SPEC.to_string(),
            matcher: compile(HEAD_SPEC)
                .map(Matcher::Compiled)
                .unwrap_or(Matcher::Never),
        }
    }

    /// Parse a list of specs, failing on the first invalid one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        names.iter().map(|name| Self::new(name.as_ref())).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_regex(&self) -> bool {
        self.name.len() > 1 && self.name.starts_with(REGEX_SENTINEL)
    }

    /// Match a reference name, expanding `$VAR` / `${VAR}` from `env` first.
    pub fn matches(&self, reference: &str, env: &HashMap<String, String>) -> Result<bool> {
        match &self.matcher {
            Matcher::Never => Ok(false),
            Matcher::Compiled(regex) => Ok(regex.is_match(reference)),
            Matcher::Deferred => {
                let expanded = expand_vars(&self.name, env);
                let expanded = expanded.trim();
                if expanded.is_empty() {
                    return Ok(false);
                }
                Ok(compile(expanded)?.is_match(reference))
            }
        }
    }

    /// Keep the names this spec matches, in input order.
    pub fn filter_matching<'a>(
        &self,
        names: &[&'a str],
        env: &HashMap<String, String>,
    ) -> Result<Vec<&'a str>> {
        let mut out = Vec::new();
        for name in names {
            if self.matches(name, env)? {
                out.push(*name);
            }
        }
        Ok(out)
    }
}

impl fmt::Display for BranchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Whether any spec in `specs` matches `reference`.
pub fn matches_any(
    specs: &[BranchSpec],
    reference: &str,
    env: &HashMap<String, String>,
) -> Result<bool> {
    for spec in specs {
        if spec.matches(reference, env)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn compile(spec: &str) -> Result<Regex> {
    if spec.len() > 1 && spec.starts_with(REGEX_SENTINEL) {
        let body = &spec[REGEX_SENTINEL.len_utf8()..];
        return Regex::new(&format!("^(?:{body})$")).map_err(|err| Error::InvalidBranchSpec {
            spec: spec.to_string(),
            reason: err.to_string(),
        });
    }

    let mut pattern = String::from("^(?:refs/heads/");
    if !spec.contains("**") && !spec.contains('/') {
        pattern.push_str("|refs/remotes/[^/]+/|remotes/[^/]+/|[^/]+/");
    } else {
        pattern.push_str("|refs/remotes/|remotes/");
    }
    pattern.push_str(")?");
    pattern.push_str(&wildcard_to_regex(spec));
    pattern.push('$');

    Regex::new(&pattern).map_err(|err| Error::InvalidBranchSpec {
        spec: spec.to_string(),
        reason: err.to_string(),
    })
}

/// Translate `*` to "within one segment" and `**` to "anything".
fn wildcard_to_regex(spec: &str) -> String {
    let mut out = String::new();
    let mut pending_star = false;
    let mut buf = [0u8; 4];
    for ch in spec.chars() {
        if ch == '*' {
            if pending_star {
                out.push_str(".*");
                pending_star = false;
            } else {
                pending_star = true;
            }
            continue;
        }
        if pending_star {
            out.push_str("[^/]*");
            pending_star = false;
        }
        out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
    }
    if pending_star {
        out.push_str("[^/]*");
    }
    out
}

/// Whether `input` holds a `$NAME` or `${NAME}` that [`expand_vars`] could
/// substitute. A `$` anchor or a `$5` is plain text.
fn has_var_reference(input: &str) -> bool {
    input.match_indices('$').any(|(pos, _)| {
        let after = &input[pos + 1..];
        match after.strip_prefix('{') {
            Some(braced) => braced.contains('}'),
            None => after
                .chars()
                .next()
                .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_'),
        }
    })
}

/// Expand `$VAR` and `${VAR}`; unknown variables are left as written.
pub fn expand_vars(input: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let key = &braced[..end];
                match env.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[pos..pos + end + 3]),
                }
                rest = &braced[end + 1..];
                continue;
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = after
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        let key = &after[..len];
        if key.is_empty() || key.starts_with(|ch: char| ch.is_ascii_digit()) {
            out.push('$');
            rest = after;
            continue;
        }
        match env.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(key);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn matches(spec: &str, name: &str) -> bool {
        BranchSpec::new(spec)
            .expect("spec")
            .matches(name, &no_env())
            .expect("match")
    }

    #[test]
    fn unqualified_name_matches_any_remote() {
        assert!(matches("master", "origin/master"));
        assert!(matches("master", "upstream/master"));
        assert!(matches("master", "refs/heads/master"));
        assert!(matches("master", "refs/remotes/origin/master"));
        assert!(matches("master", "remotes/origin/master"));
        assert!(!matches("master", "origin/feature/master"));
        assert!(!matches("master", "refs/tags/master"));
    }

    #[test]
    fn qualified_name_matches_literally() {
        assert!(matches("origin/master", "origin/master"));
        assert!(matches("origin/master", "refs/remotes/origin/master"));
        assert!(!matches("origin/master", "upstream/master"));
        assert!(matches("refs/tags/v1", "refs/tags/v1"));
    }

    #[test]
    fn single_star_stays_in_segment() {
        assert!(matches("origin/feature-*", "origin/feature-login"));
        assert!(!matches("origin/feature-*", "origin/feature-a/b"));
        assert!(matches("*/master", "origin/master"));
        assert!(!matches("*/master", "origin/nested/master"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(matches("**", "origin/master"));
        assert!(matches("**", "refs/tags/v1.0"));
        assert!(matches("origin/**", "origin/feature/a/b"));
        assert!(matches("**/release", "origin/team/release"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        assert!(matches("origin/v1.0", "origin/v1.0"));
        assert!(!matches("origin/v1.0", "origin/v1x0"));
        assert!(matches("origin/a+b", "origin/a+b"));
    }

    #[test]
    fn regex_spec_matches_whole_name() {
        assert!(matches(":origin/(master|develop)", "origin/develop"));
        assert!(!matches(":origin/(master|develop)", "origin/develop2"));
        assert!(matches(":.*release.*", "refs/tags/release-1"));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let err = BranchSpec::new(":origin/(unclosed").expect_err("invalid regex");
        assert!(matches!(err, Error::InvalidBranchSpec { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn empty_spec_matches_nothing() {
        assert!(!matches("", "origin/master"));
        assert!(!matches("   ", "master"));
    }

    #[test]
    fn head_spec_matches_remote_heads() {
        let head = BranchSpec::head();
        assert!(head.matches("origin/HEAD", &no_env()).expect("match"));
        assert!(!head.matches("origin/master", &no_env()).expect("match"));
    }

    #[test]
    fn variables_expand_before_matching() {
        let spec = BranchSpec::new("origin/${BRANCH}").expect("spec");
        let mut env = HashMap::new();
        env.insert("BRANCH".to_string(), "release".to_string());
        assert!(spec.matches("origin/release", &env).expect("match"));
        assert!(!spec.matches("origin/master", &env).expect("match"));

        let bare = BranchSpec::new("$BRANCH").expect("spec");
        assert!(bare.matches("origin/release", &env).expect("match"));
    }

    #[test]
    fn expanded_invalid_regex_surfaces_at_match_time() {
        let spec = BranchSpec::new("$PATTERN").expect("deferred spec");
        let mut env = HashMap::new();
        env.insert("PATTERN".to_string(), ":(".to_string());
        assert!(spec.matches("origin/master", &env).is_err());
    }

    #[test]
    fn expand_vars_leaves_unknowns() {
        let env = HashMap::from([("A".to_string(), "x".to_string())]);
        assert_eq!(expand_vars("$A/${A}/$B/${B}", &env), "x/x/$B/${B}");
        assert_eq!(expand_vars("cost $5", &env), "cost $5");
        assert_eq!(expand_vars("${unterminated", &env), "${unterminated");
    }

    #[test]
    fn filter_matching_keeps_order() {
        let spec = BranchSpec::new("origin/*").expect("spec");
        let names = ["origin/b", "upstream/a", "origin/a"];
        let kept = spec.filter_matching(&names, &no_env()).expect("filter");
        assert_eq!(kept, vec!["origin/b", "origin/a"]);
    }

    #[test]
    fn end_anchor_regex_compiles_at_construction() {
        let err = BranchSpec::new(":(origin/master$").expect_err("unbalanced regex");
        assert!(matches!(err, Error::InvalidBranchSpec { .. }));

        assert!(matches(":origin/master$", "origin/master"));
        assert!(matches(":origin/(master|v[0-9]+)$", "origin/v2"));
        assert!(BranchSpec::new("origin/cost$5").is_ok());
    }

    #[test]
    fn only_real_variable_references_defer() {
        assert!(has_var_reference("origin/$BRANCH"));
        assert!(has_var_reference("origin/${BRANCH}"));
        assert!(has_var_reference("$_private"));
        assert!(!has_var_reference(":origin/master$"));
        assert!(!has_var_reference("cost $5"));
        assert!(!has_var_reference("${unterminated"));
    }
}
