//! Inference of a GitHub repository from package-index metadata.
//!
//! The index has no dedicated "repository" field, so the owner/repo pair is
//! inferred from the `project_urls` map (well-known keys first), then the
//! home page, then a URL grep over the long description — and only when the
//! result actually points at `github.com`.

use core::fmt::{Display, Formatter, Result as FmtResult};
use serde_json::Value;
use std::sync::LazyLock;

const GH_URL_BASE: &str = "github.com/";

/// `project_urls` keys tried in order, case-insensitively.
const URL_KEY_PRECEDENCE: [&str; 8] = [
    "github",
    "source",
    "repository",
    "code",
    "homepage",
    "download",
    "source code",
    "changelog",
];

/// Matches `https://github.com/<owner>/<repo...>` inside free text.
static REPO_URL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"https?://(?:www\.)?github\.com/[^/\s<>"'()]+/[^/\s<>"'()]+"#).expect("invalid regex")
});

/// An owner/repo pair on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    owner: String,
    repo: String,
}

impl RepoRef {
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Parse a `github.com/...` URL into an owner/repo pair, stripping any
    /// `.git` suffix. Returns `None` for URLs without both components.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let (_, body) = url.split_once(GH_URL_BASE)?;
        let mut parts = body.split('/').filter(|part| !part.is_empty());
        let owner = parts.next()?;
        let repo = parts.next()?.trim_end_matches(".git");
        if repo.is_empty() {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl Display for RepoRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Infer the GitHub repository for a package from its index `info` object.
///
/// `name` is the canonical package name, used to disambiguate URLs found in
/// places that routinely link to unrelated repositories.
#[must_use]
pub fn infer_repo(name: &str, info: &Value) -> Option<RepoRef> {
    let project_urls = info.get("project_urls").and_then(Value::as_object);

    if let Some(urls) = project_urls {
        // Well-known keys take precedence, case-insensitively.
        for key in URL_KEY_PRECEDENCE {
            let url = urls
                .iter()
                .find(|(k, _)| k.to_lowercase() == key)
                .and_then(|(_, v)| v.as_str());
            if let Some(url) = url
                && url.contains(GH_URL_BASE)
            {
                return RepoRef::parse(url);
            }
        }

        // Any remaining URL that mentions both GitHub and the package name.
        for url in urls.values().filter_map(Value::as_str) {
            if url.contains(GH_URL_BASE) && url.contains(name) {
                return RepoRef::parse(url);
            }
        }
    }

    if let Some(home_page) = info.get("home_page").and_then(Value::as_str)
        && home_page.to_lowercase().contains(GH_URL_BASE)
    {
        return RepoRef::parse(home_page);
    }

    // Last resort: grep the description, but only trust URLs naming the package.
    let description = info.get("description").and_then(Value::as_str).unwrap_or_default();
    if let Some(m) = REPO_URL_REGEX.find(description)
        && m.as_str().contains(name)
    {
        return RepoRef::parse(m.as_str());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_strips_git_suffix() {
        let repo = RepoRef::parse("https://github.com/pallets/flask.git").unwrap();
        assert_eq!(repo.owner(), "pallets");
        assert_eq!(repo.repo(), "flask");
    }

    #[test]
    fn test_parse_ignores_extra_path_segments() {
        let repo = RepoRef::parse("https://github.com/pallets/flask/tree/main").unwrap();
        assert_eq!(repo.to_string(), "pallets/flask");
    }

    #[test]
    fn test_parse_rejects_bare_owner() {
        assert!(RepoRef::parse("https://github.com/pallets").is_none());
        assert!(RepoRef::parse("https://example.com/pallets/flask").is_none());
    }

    #[test]
    fn test_infer_from_project_urls_precedence() {
        let info = json!({
            "project_urls": {
                "Documentation": "https://flask.palletsprojects.com",
                "Source": "https://github.com/pallets/flask",
                "Changelog": "https://github.com/pallets/other"
            }
        });
        let repo = infer_repo("flask", &info).unwrap();
        assert_eq!(repo.to_string(), "pallets/flask");
    }

    #[test]
    fn test_infer_key_match_is_case_insensitive() {
        let info = json!({ "project_urls": { "GitHub": "https://github.com/org/pkg" } });
        assert_eq!(infer_repo("pkg", &info).unwrap().to_string(), "org/pkg");
    }

    #[test]
    fn test_infer_fallback_requires_name_match() {
        let info = json!({
            "project_urls": {
                "Funding": "https://github.com/sponsors/someone",
                "Tracker": "https://github.com/org/mypkg/issues"
            }
        });
        assert_eq!(infer_repo("mypkg", &info).unwrap().to_string(), "org/mypkg");
        assert!(infer_repo("otherpkg", &info).is_none());
    }

    #[test]
    fn test_infer_from_home_page() {
        let info = json!({ "home_page": "https://github.com/psf/requests" });
        assert_eq!(infer_repo("requests", &info).unwrap().to_string(), "psf/requests");
    }

    #[test]
    fn test_infer_from_description_grep() {
        let info = json!({
            "home_page": "https://example.com",
            "description": "See https://github.com/org/widget for sources."
        });
        assert_eq!(infer_repo("widget", &info).unwrap().to_string(), "org/widget");
    }

    #[test]
    fn test_infer_none_when_not_derivable() {
        let info = json!({
            "home_page": "https://gitlab.com/org/pkg",
            "project_urls": { "Docs": "https://pkg.readthedocs.io" }
        });
        assert!(infer_repo("pkg", &info).is_none());
        assert!(infer_repo("pkg", &json!({})).is_none());
    }
}
