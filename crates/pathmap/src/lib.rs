#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `pathmap` turns a logical file name (an `lfn`, e.g. a grid storage path)
//! into a pool name and an object id inside that pool. Callers ask a
//! [`PathMapper`] to [`PathMapper::parse`] a logical path; the mapper applies
//! zero or more regex-rewrite rules loaded from an XML rule file and then
//! splits the (possibly rewritten) path into `pool:object-id` form.
//!
//! # Design
//!
//! Rewrite rules come from `lfn-to-pfn` elements in an XML document (see
//! [`PathMapper::from_xml_str`]). Only elements whose `protocol` attribute is
//! `"direct"` are loaded; others are assumed to describe protocols this
//! daemon does not serve. Rules are tried in document order and the first
//! whose `path-match` regex matches wins; its `result` template is expanded
//! by substituting `$1`, `$2`, ... with the corresponding capture groups.
//! If no rule matches, the original path is used unmodified.
//!
//! After rewriting, the result is always split into `pool:object-id` using
//! [`split_pool_and_object`], which requires the generic `pool-name:object-id`
//! form; a rewritten path without a `:` is a bad-path failure.
//!
//! # Invariants
//!
//! - Rules are evaluated in the order they appear in the XML document;
//!   earlier rules take priority over later, more general ones.
//! - A `result` template that references a capture group beyond what the
//!   matching regex actually captured is a configuration error, not a panic.
//! - The pool/object split always runs, whether or not a rewrite rule
//!   matched, and any query string (`?...`) is stripped beforehand.
//!
//! # Errors
//!
//! [`PathMapError`] covers malformed rule XML, regexes that fail to compile,
//! `result` templates referencing out-of-range capture groups, and paths
//! that cannot be split into `pool:object-id` form.
//!
//! # Examples
//!
//! ```
//! use pathmap::PathMapper;
//!
//! let mapper = PathMapper::identity();
//! let object = mapper.parse("atlaspool:data/run1/file.dat").unwrap();
//! assert_eq!(object.pool(), "atlaspool");
//! assert_eq!(object.object_id(), "data/run1/file.dat");
//! ```

use regex::Regex;
use std::fmt;

/// Errors produced while loading rewrite rules or parsing a logical path.
#[derive(Debug, thiserror::Error)]
pub enum PathMapError {
    /// The rule document could not be parsed as XML.
    #[error("malformed path-mapping rule document: {0}")]
    MalformedXml(String),
    /// A `path-match` or fallback-splitter pattern failed to compile as a regex.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// The underlying compilation error.
        #[source]
        source: regex::Error,
    },
    /// A `result` template referenced a capture group the matching regex did not produce.
    #[error("rule result template references group ${group} but only {available} were captured")]
    GroupOutOfRange {
        /// The group index the template referenced.
        group: usize,
        /// The number of groups the match actually captured.
        available: usize,
    },
    /// The rewritten path could not be split into `pool:object-id` form.
    #[error("path {0:?} does not match the pool:object-id form")]
    Unsplittable(String),
}

/// A pool-qualified object location: a pool name and an object id within it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolObject {
    pool: String,
    object_id: String,
}

impl PoolObject {
    /// The pool this object lives in.
    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// The object's id within [`Self::pool`].
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

impl fmt::Display for PoolObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pool, self.object_id)
    }
}

/// One ordered rewrite rule: a compiled match pattern and its result template.
#[derive(Debug)]
struct Rule {
    path_match: Regex,
    result: String,
}

/// Maps logical file names to pool-qualified object locations.
#[derive(Debug)]
pub struct PathMapper {
    rules: Vec<Rule>,
    nominal_split: Regex,
}

impl PathMapper {
    /// Builds a mapper with no rewrite rules: every path is split directly
    /// via [`split_pool_and_object`].
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rules: Vec::new(),
            nominal_split: nominal_split_regex(),
        }
    }

    /// Loads rewrite rules from an XML document's text content.
    ///
    /// Only `lfn-to-pfn` elements with `protocol="direct"` are kept; rules
    /// are retained in document order.
    ///
    /// # Errors
    ///
    /// Returns [`PathMapError::MalformedXml`] if `xml` does not parse, and
    /// [`PathMapError::InvalidRegex`] if any rule's `path-match` attribute is
    /// not a valid regex.
    pub fn from_xml_str(xml: &str) -> Result<Self, PathMapError> {
        let doc = roxmltree::Document::parse(xml).map_err(|err| PathMapError::MalformedXml(err.to_string()))?;

        let mut rules = Vec::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("lfn-to-pfn")) {
            let protocol = node.attribute("protocol").unwrap_or_default();
            if protocol != "direct" {
                continue;
            }

            let pattern = node.attribute("path-match").unwrap_or_default();
            let result = node.attribute("result").unwrap_or_default();

            let path_match = Regex::new(pattern).map_err(|source| PathMapError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;

            rules.push(Rule {
                path_match,
                result: result.to_string(),
            });
        }

        Ok(Self {
            rules,
            nominal_split: nominal_split_regex(),
        })
    }

    /// Rewrites `lfn` using the first matching rule, then splits the
    /// (possibly rewritten) path into a pool-qualified object location.
    ///
    /// Any `?`-prefixed query string is stripped from the input before
    /// matching, mirroring how CGI-style trailers are discarded by callers
    /// that pass whole request paths through.
    ///
    /// # Errors
    ///
    /// Returns [`PathMapError::GroupOutOfRange`] if a matching rule's
    /// `result` template references a capture group the regex did not
    /// produce, and [`PathMapError::Unsplittable`] if the final path does not
    /// match the generic `pool:object-id` form.
    pub fn parse(&self, lfn: &str) -> Result<PoolObject, PathMapError> {
        let lfn = lfn.split('?').next().unwrap_or(lfn);
        let rewritten = self.apply_rules(lfn)?;
        split_pool_and_object(&rewritten, &self.nominal_split)
    }

    fn apply_rules(&self, path: &str) -> Result<String, PathMapError> {
        for rule in &self.rules {
            let Some(captures) = rule.path_match.captures(path) else {
                continue;
            };
            return expand_template(&rule.result, &captures);
        }
        Ok(path.to_string())
    }
}

/// Expands `$1`, `$2`, ... references in `template` using `captures`.
fn expand_template(template: &str, captures: &regex::Captures<'_>) -> Result<String, PathMapError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }

        let mut digits = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_ascii_digit() {
                digits.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if digits.is_empty() {
            out.push('$');
            continue;
        }

        let group: usize = digits.parse().unwrap_or(0);
        let available = captures.len().saturating_sub(1);
        let matched = captures.get(group).ok_or(PathMapError::GroupOutOfRange { group, available })?;
        out.push_str(matched.as_str());
    }

    Ok(out)
}

/// Splits a path into `(pool, object_id)`.
///
/// The path must take the generic `pool-name:object-id` form; anything else
/// is a bad-path failure.
///
/// # Errors
///
/// Returns [`PathMapError::Unsplittable`] if the form does not match.
pub fn split_pool_and_object(path: &str, nominal_split: &Regex) -> Result<PoolObject, PathMapError> {
    if let Some(captures) = nominal_split.captures(path) {
        return Ok(PoolObject {
            pool: captures[1].to_string(),
            object_id: captures[2].to_string(),
        });
    }

    Err(PathMapError::Unsplittable(path.to_string()))
}

fn nominal_split_regex() -> Regex {
    Regex::new(r"^/*([a-zA-Z0-9_-]+):(.*)").expect("static nominal split pattern is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapper_rejects_unprefixed_store_path() {
        let mapper = PathMapper::identity();
        let err = mapper.parse("/store/data/run1/file.dat").unwrap_err();
        assert!(matches!(err, PathMapError::Unsplittable(_)));
    }

    #[test]
    fn identity_mapper_splits_nominal_form() {
        let mapper = PathMapper::identity();
        let object = mapper.parse("atlaspool:path/to/object").unwrap();
        assert_eq!(object.pool(), "atlaspool");
        assert_eq!(object.object_id(), "path/to/object");
    }

    #[test]
    fn identity_mapper_rejects_unsplittable_path() {
        let mapper = PathMapper::identity();
        let err = mapper.parse("no-colon-here").unwrap_err();
        assert!(matches!(err, PathMapError::Unsplittable(_)));
    }

    #[test]
    fn query_string_is_stripped_before_matching() {
        let mapper = PathMapper::identity();
        let object = mapper.parse("atlaspool:path/to/object?a=1&b=2").unwrap();
        assert_eq!(object.object_id(), "path/to/object");
    }

    #[test]
    fn xml_rule_rewrites_path_before_split() {
        let xml = r#"
            <storage-mapping>
                <lfn-to-pfn protocol="direct" path-match="^/grid/(atlas)/(.*)" result="$1:$2" />
                <lfn-to-pfn protocol="xrootd" path-match="^/grid/(.*)" result="xroot://$1" />
            </storage-mapping>
        "#;
        let mapper = PathMapper::from_xml_str(xml).unwrap();
        let object = mapper.parse("/grid/atlas/data/file.root").unwrap();
        assert_eq!(object.pool(), "atlas");
        assert_eq!(object.object_id(), "data/file.root");
    }

    #[test]
    fn non_direct_protocol_rules_are_ignored() {
        let xml = r#"
            <storage-mapping>
                <lfn-to-pfn protocol="xrootd" path-match="^/grid/(.*)" result="xroot://$1" />
            </storage-mapping>
        "#;
        let mapper = PathMapper::from_xml_str(xml).unwrap();
        // No direct rule loaded, so the path falls through unmodified and is
        // split via the generic form.
        let object = mapper.parse("grid:leftover").unwrap();
        assert_eq!(object.pool(), "grid");
    }

    #[test]
    fn earlier_rule_wins_over_later_more_general_rule() {
        let xml = r#"
            <storage-mapping>
                <lfn-to-pfn protocol="direct" path-match="^/special/(.*)" result="special:$1" />
                <lfn-to-pfn protocol="direct" path-match="^/(.*)" result="general:$1" />
            </storage-mapping>
        "#;
        let mapper = PathMapper::from_xml_str(xml).unwrap();
        let object = mapper.parse("/special/item").unwrap();
        assert_eq!(object.pool(), "special");
        assert_eq!(object.object_id(), "item");
    }

    #[test]
    fn result_template_referencing_missing_group_is_an_error() {
        let xml = r#"
            <storage-mapping>
                <lfn-to-pfn protocol="direct" path-match="^/(one)$" result="$1:$2" />
            </storage-mapping>
        "#;
        let mapper = PathMapper::from_xml_str(xml).unwrap();
        let err = mapper.parse("/one").unwrap_err();
        assert!(matches!(err, PathMapError::GroupOutOfRange { group: 2, .. }));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        let err = PathMapper::from_xml_str("<unclosed>").unwrap_err();
        assert!(matches!(err, PathMapError::MalformedXml(_)));
    }
}
