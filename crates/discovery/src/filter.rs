//! Include/exclude path globs
//!
//! Globs match URL paths. `*` matches within one path segment, `**` across
//! segments, `{a,b}` alternates. Trailing slashes on both globs and paths are
//! ignored. An empty include list allows every path; exclude always wins.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use url::Url;

use parade_common::DiscoveryError;

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, DiscoveryError> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// Whether the filter lets everything through.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    #[must_use]
    pub fn allows_path(&self, path: &str) -> bool {
        let path = trim_trailing_slash(path);
        self.included(path) && !self.excluded(path)
    }

    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        self.allows_path(url.path())
    }

    /// Like [`allows`](Self::allows) but skipping the include check.
    #[must_use]
    pub fn allows_entry(&self, url: &Url) -> bool {
        !self.excluded(trim_trailing_slash(url.path()))
    }

    fn included(&self, path: &str) -> bool {
        self.include.as_ref().map_or(true, |set| set.is_match(path))
    }

    fn excluded(&self, path: &str) -> bool {
        self.exclude.as_ref().is_some_and(|set| set.is_match(path))
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some("") | None => path,
        Some(trimmed) => trimmed,
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, DiscoveryError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let invalid = |glob: &str, e: globset::Error| DiscoveryError::InvalidGlob {
        glob: glob.to_string(),
        reason: e.kind().to_string(),
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if Url::parse(pattern).is_ok() {
            return Err(DiscoveryError::InvalidGlob {
                glob: pattern.clone(),
                reason: "globs match paths, not full URLs".to_string(),
            });
        }
        let glob = GlobBuilder::new(trim_trailing_slash(pattern))
            .literal_separator(true)
            .build()
            .map_err(|e| invalid(pattern.as_str(), e))?;
        builder.add(glob);
    }
    builder.build().map(Some).map_err(|e| invalid("<set>", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
        let owned = |globs: &[&str]| globs.iter().map(|g| g.to_string()).collect::<Vec<_>>();
        PathFilter::new(&owned(include), &owned(exclude)).unwrap()
    }

    #[test]
    fn empty_include_allows_any_path() {
        let f = filter(&[], &[]);
        assert!(f.is_empty());
        assert!(f.allows_path("/foo"));
        assert!(f.allows_path("/"));
        assert!(f.allows_path("/asdf/1234"));
    }

    #[test]
    fn static_include() {
        let f = filter(&["/foo"], &[]);
        assert!(f.allows_path("/foo"));
        assert!(f.allows_path("/foo/"));
        assert!(!f.allows_path("/foo/bar"));
        assert!(!f.allows_path("/foobar"));
        assert!(!f.allows_path("/asdf"));
    }

    #[test]
    fn star_matches_one_segment() {
        let f = filter(&["/foo/*"], &[]);
        assert!(!f.allows_path("/foo"));
        assert!(f.allows_path("/foo/bar"));
        assert!(f.allows_path("/foo/bar/"));
        assert!(!f.allows_path("/foo/bar/baz"));

        let f = filter(&["/foo/*/bar"], &[]);
        assert!(f.allows_path("/foo/asdf/bar/"));
        assert!(!f.allows_path("/foo/bar"));
    }

    #[test]
    fn trailing_slash_on_glob_is_ignored() {
        let f = filter(&["/foo/"], &[]);
        assert!(f.allows_path("/foo/"));
        assert!(f.allows_path("/foo"));
        assert!(!f.allows_path("/foo/bar"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = filter(&["/foo/*"], &["/foo/asdf"]);
        assert!(f.allows_path("/foo/bar"));
        assert!(!f.allows_path("/foo/asdf"));
        assert!(f.allows_path("/foo/asdfasdf"));
    }

    #[test]
    fn globstar_in_include_and_exclude() {
        let f = filter(&["/foo/**"], &["/foo/asdf/**"]);
        assert!(!f.allows_path("/foo"));
        assert!(f.allows_path("/foo/sdf"));
        assert!(f.allows_path("/foo/sdf/asdf/"));
        assert!(f.allows_path("/foo/asdf"));
        assert!(!f.allows_path("/foo/asdf/foo"));
        assert!(!f.allows_path("/foo/asdf/foo/bar"));
    }

    #[test]
    fn alternation() {
        let f = filter(&["/{foo,bar}/*"], &[]);
        assert!(f.allows_path("/foo/asdf"));
        assert!(f.allows_path("/bar/asdf/"));
        assert!(!f.allows_path("/1234/asdf"));
    }

    #[test]
    fn entry_skips_include_but_not_exclude() {
        let f = filter(&["/blog/*"], &["/private"]);
        let home = Url::parse("https://a.example/").unwrap();
        assert!(!f.allows(&home));
        assert!(f.allows_entry(&home));
        assert!(!f.allows_entry(&Url::parse("https://a.example/private/").unwrap()));
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = PathFilter::new(&["/foo/[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidGlob { .. }));
    }

    #[test]
    fn full_url_glob_is_rejected() {
        let err = PathFilter::new(&[], &["https://a.example/foo".to_string()]).unwrap_err();
        assert!(err.to_string().contains("not full URLs"));
    }
}
