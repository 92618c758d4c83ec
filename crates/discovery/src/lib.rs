//! Parade Discovery - URL sources and path filtering
//!
//! Turns the user's entry argument into a [`Discovery`] source:
//! - absolute URL: "https://example.com/" (audited on its own)
//! - URL list file: "urls.txt" (one URL per line, `#` comments)
//! - stdin: "-"
//!
//! Include/exclude path globs wrap any source in a [`FilteredDiscovery`].

mod filter;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub use filter::PathFilter;
pub use sources::{parse_page_url, FilteredDiscovery, StaticDiscovery, UrlFileDiscovery};

use parade_common::{Discovery, DiscoveryError};

/// Where URLs come from, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Url(Url),
    File(PathBuf),
}

impl Entry {
    /// Classify `input`. Anything with a scheme must be a valid http(s) URL;
    /// everything else is a path.
    pub fn parse(input: &str) -> Result<Self, DiscoveryError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DiscoveryError::InvalidEntry {
                url: String::new(),
                reason: "no entry URL or file given".to_string(),
            });
        }
        if input.contains("://") {
            return parse_page_url(input)
                .map(Entry::Url)
                .map_err(|reason| DiscoveryError::InvalidEntry {
                    url: input.to_string(),
                    reason,
                });
        }
        Ok(Entry::File(PathBuf::from(input)))
    }

    /// Build the source for this entry, filtered by `filter`.
    #[must_use]
    pub fn into_discovery(self, filter: PathFilter) -> Arc<dyn Discovery> {
        let (inner, entry) = match self {
            Entry::Url(url) => {
                let list: Arc<dyn Discovery> = Arc::new(StaticDiscovery::new([url.clone()]));
                (list, Some(url))
            }
            Entry::File(path) => {
                let file: Arc<dyn Discovery> = Arc::new(UrlFileDiscovery::new(path));
                (file, None)
            }
        };
        if filter.is_empty() {
            return inner;
        }
        let filtered = FilteredDiscovery::new(inner, filter);
        match entry {
            Some(url) => Arc::new(filtered.with_entry(url)),
            None => Arc::new(filtered),
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Url(url) => write!(f, "{url}"),
            Entry::File(path) if path.as_os_str() == "-" => f.write_str("<stdin>"),
            Entry::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_classification() {
        assert!(matches!(
            Entry::parse("https://a.example").unwrap(),
            Entry::Url(url) if url.as_str() == "https://a.example/"
        ));
        assert_eq!(Entry::parse("urls.txt").unwrap(), Entry::File("urls.txt".into()));
        assert_eq!(Entry::parse("-").unwrap().to_string(), "<stdin>");
    }

    #[test]
    fn test_bad_entries() {
        assert!(Entry::parse("   ").is_err());
        assert!(Entry::parse("ftp://a.example/").is_err());
        assert!(Entry::parse("https://").is_err());
    }

    #[tokio::test]
    async fn test_url_entry_survives_include_globs() {
        let filter = PathFilter::new(&["/blog/**".to_string()], &[]).unwrap();
        let discovery = Entry::parse("https://a.example/").unwrap().into_discovery(filter);

        let mut urls: Vec<String> = Vec::new();
        discovery
            .discover(&mut |url: String| urls.push(url))
            .await
            .unwrap();
        assert_eq!(urls, ["https://a.example/"]);
    }
}
