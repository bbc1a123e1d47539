//! Parsing of pinned requirements files.
//!
//! Only exactly-pinned specs (`name==version`) are supported; everything else
//! (editable installs, local paths, version ranges, malformed lines) degrades
//! to a [`ParseWarning`] and parsing continues. No line ever aborts the run.

use crate::identity::{PackageId, canonical_name};
use core::fmt::{Display, Formatter, Result as FmtResult};
use std::collections::BTreeMap;

/// The only version operator that yields a usable identity.
pub const PIN_OPERATOR: &str = "==";

const RANGE_OPERATORS: [&str; 6] = ["~=", ">=", "<=", "!=", ">", "<"];

/// Why a requirement line could not be turned into a package identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// An editable install (`-e ...` / `--editable ...`).
    Editable,
    /// A local filesystem reference (`file://...`, `./pkg`, `/abs/path`).
    LocalPath,
    /// A range specifier or bare name; version-pinned metrics need `==`.
    Unpinned,
    /// Anything else we could not make sense of.
    Malformed(String),
}

impl Display for UnsupportedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Editable => write!(f, "editable installs are not supported"),
            Self::LocalPath => write!(f, "local path references are not supported"),
            Self::Unpinned => write!(f, "only exact pins (name==version) are supported"),
            Self::Malformed(detail) => write!(f, "unparseable requirement: {detail}"),
        }
    }
}

/// A non-fatal notice about one skipped requirement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the input.
    pub line: usize,
    /// The offending line, trimmed.
    pub content: String,
    pub reason: UnsupportedReason,
}

impl Display for ParseWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "line {}: '{}': {}", self.line, self.content, self.reason)
    }
}

/// One parsed requirement line: either a pinned identity or an unsupported form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementEntry {
    Pinned(PackageId),
    Unsupported(UnsupportedReason),
}

/// The outcome of parsing a requirements file.
///
/// `packages` is deduplicated on canonical identity name with
/// last-occurrence-wins semantics, so re-pinning a package later in the file
/// overrides the earlier line. Order is alphabetical by canonical name.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequirements {
    pub packages: Vec<PackageId>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedRequirements {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Parse the full text of a requirements file.
#[must_use]
pub fn parse_str(content: &str) -> ParsedRequirements {
    let mut by_name: BTreeMap<String, PackageId> = BTreeMap::new();
    let mut warnings = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let Some(line) = strip_noise(raw) else {
            continue;
        };

        match parse_line(line) {
            RequirementEntry::Pinned(id) => {
                // Last occurrence wins, including when versions differ.
                let _ = by_name.insert(id.name().to_string(), id);
            }
            RequirementEntry::Unsupported(reason) => warnings.push(ParseWarning {
                line: index + 1,
                content: line.to_string(),
                reason,
            }),
        }
    }

    ParsedRequirements {
        packages: by_name.into_values().collect(),
        warnings,
    }
}

/// Parse a single, already-trimmed requirement line.
#[must_use]
pub fn parse_line(line: &str) -> RequirementEntry {
    if line.starts_with("-e ") || line.starts_with("--editable") {
        return RequirementEntry::Unsupported(UnsupportedReason::Editable);
    }

    if line.contains("file://") || line.starts_with("./") || line.starts_with("../") || line.starts_with('/') {
        return RequirementEntry::Unsupported(UnsupportedReason::LocalPath);
    }

    if line.starts_with('-') {
        // Other pip options (-r, -c, --hash, ...) name no package at all.
        return RequirementEntry::Unsupported(UnsupportedReason::Malformed(format!("unsupported option '{line}'")));
    }

    // Environment markers don't affect the identity.
    let spec = line.split(';').next().unwrap_or(line).trim();

    // `===` (arbitrary equality) is not an exact pin in the sense we need.
    if spec.contains("===") {
        return RequirementEntry::Unsupported(UnsupportedReason::Unpinned);
    }

    if let Some((name_part, version)) = spec.split_once(PIN_OPERATOR) {
        let name = strip_extras(name_part).trim();
        let version = version.trim();
        if name.is_empty() || version.is_empty() {
            return RequirementEntry::Unsupported(UnsupportedReason::Malformed(format!("missing name or version in '{spec}'")));
        }
        if version.contains(|c: char| c.is_whitespace()) || RANGE_OPERATORS.iter().any(|op| version.contains(op)) {
            return RequirementEntry::Unsupported(UnsupportedReason::Malformed(format!("invalid version '{version}'")));
        }
        if canonical_name(name).is_empty() {
            return RequirementEntry::Unsupported(UnsupportedReason::Malformed(format!("invalid package name '{name}'")));
        }
        return RequirementEntry::Pinned(PackageId::new(name, version));
    }

    // Range specifiers and bare names are unpinned.
    RequirementEntry::Unsupported(UnsupportedReason::Unpinned)
}

/// Trim a raw line and strip trailing comments; returns `None` for blank and
/// comment-only lines.
fn strip_noise(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    // An inline comment needs whitespace before the '#'.
    let line = match line.find(" #") {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    };

    if line.is_empty() { None } else { Some(line) }
}

/// Strip an extras suffix (`name[extra1,extra2]`) from the name portion.
fn strip_extras(name: &str) -> &str {
    match name.find('[') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pin() {
        let parsed = parse_str("flask==3.0.0\n");
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.packages, vec![PackageId::new("flask", "3.0.0")]);
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let parsed = parse_str("\n# a comment\n   \nflask==3.0.0\n");
        assert_eq!(parsed.packages.len(), 1);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_inline_comment_stripped() {
        let parsed = parse_str("flask==3.0.0  # the web framework\n");
        assert_eq!(parsed.packages, vec![PackageId::new("flask", "3.0.0")]);
    }

    #[test]
    fn test_editable_line_warns() {
        let parsed = parse_str("-e file:///home/me/proj\nflask==3.0.0\n");
        assert_eq!(parsed.packages.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].reason, UnsupportedReason::Editable);
        assert_eq!(parsed.warnings[0].line, 1);
    }

    #[test]
    fn test_local_path_warns() {
        let parsed = parse_str("./vendored/pkg\nfile:///x/y.whl\n");
        assert!(parsed.packages.is_empty());
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.warnings.iter().all(|w| w.reason == UnsupportedReason::LocalPath));
    }

    #[test]
    fn test_range_specifiers_are_unpinned() {
        for line in ["requests>=2.0", "requests~=2.31", "requests<3", "requests!=2.30.0", "requests"] {
            assert_eq!(
                parse_line(line),
                RequirementEntry::Unsupported(UnsupportedReason::Unpinned),
                "line: {line}"
            );
        }
    }

    #[test]
    fn test_arbitrary_equality_is_unpinned() {
        assert_eq!(parse_line("foo===1.0"), RequirementEntry::Unsupported(UnsupportedReason::Unpinned));
    }

    #[test]
    fn test_extras_stripped_from_name() {
        let RequirementEntry::Pinned(id) = parse_line("uvicorn[standard]==0.27.0") else {
            panic!("expected a pinned entry");
        };
        assert_eq!(id.name(), "uvicorn");
        assert_eq!(id.version(), "0.27.0");
    }

    #[test]
    fn test_environment_marker_stripped() {
        let RequirementEntry::Pinned(id) = parse_line("tomli==2.0.1; python_version < \"3.11\"") else {
            panic!("expected a pinned entry");
        };
        assert_eq!(id.to_string(), "tomli==2.0.1");
    }

    #[test]
    fn test_malformed_lines_degrade() {
        let parsed = parse_str("==1.0\nflask==\n--hash=sha256:abc\n");
        assert!(parsed.packages.is_empty());
        assert_eq!(parsed.warnings.len(), 3);
        for warning in &parsed.warnings {
            assert!(matches!(warning.reason, UnsupportedReason::Malformed(_)), "{warning}");
        }
    }

    #[test]
    fn test_duplicate_lines_last_occurrence_wins() {
        let parsed = parse_str("flask==2.0.0\nrequests==2.31.0\nflask==3.0.0\n");
        assert_eq!(
            parsed.packages,
            vec![PackageId::new("flask", "3.0.0"), PackageId::new("requests", "2.31.0")]
        );
    }

    #[test]
    fn test_duplicates_collapse_across_name_spellings() {
        let parsed = parse_str("python_dateutil==2.8.2\nPython-Dateutil==2.9.0\n");
        assert_eq!(parsed.packages, vec![PackageId::new("python-dateutil", "2.9.0")]);
    }

    #[test]
    fn test_scenario_editable_plus_pin() {
        let parsed = parse_str("flask==3.0.0\n-e file:///x\n");
        assert_eq!(parsed.packages, vec![PackageId::new("flask", "3.0.0")]);
        assert_eq!(parsed.warnings.len(), 1);
    }
}
