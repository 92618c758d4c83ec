//! Discovery sources

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};
use url::Url;

use parade_common::{Discovery, DiscoveryError};

use crate::filter::PathFilter;

/// Parse an absolute http(s) URL.
pub fn parse_page_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

/// A fixed list of URLs, emitted in order without duplicates.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    urls: Vec<Url>,
}

impl StaticDiscovery {
    pub fn new(urls: impl IntoIterator<Item = Url>) -> Self {
        Self {
            urls: urls.into_iter().collect(),
        }
    }

    /// Parse every entry, failing on the first invalid one.
    pub fn parse<I, S>(urls: I) -> Result<Self, DiscoveryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls = urls
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                parse_page_url(raw).map_err(|reason| DiscoveryError::InvalidEntry {
                    url: raw.to_string(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { urls })
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self, emit: &mut (dyn FnMut(String) + Send)) -> Result<(), DiscoveryError> {
        let mut seen = HashSet::new();
        for url in &self.urls {
            if seen.insert(url.as_str()) {
                emit(url.to_string());
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "list"
    }
}

/// One URL per line from a file, or from stdin for `-`.
///
/// Blank lines and lines starting with `#` are skipped. Lines that are not
/// absolute http(s) URLs are logged and skipped.
#[derive(Debug, Clone)]
pub struct UrlFileDiscovery {
    path: PathBuf,
    name: String,
}

impl UrlFileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    #[must_use]
    pub fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }
}

#[async_trait]
impl Discovery for UrlFileDiscovery {
    #[instrument(skip_all, fields(source = %self.name))]
    async fn discover(&self, emit: &mut (dyn FnMut(String) + Send)) -> Result<(), DiscoveryError> {
        let emitted = if self.is_stdin() {
            read_urls(BufReader::new(tokio::io::stdin()), emit).await?
        } else {
            let file = tokio::fs::File::open(&self.path).await?;
            read_urls(BufReader::new(file), emit).await?
        };
        info!(urls = emitted, "finished reading URLs");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn read_urls<R>(
    reader: R,
    emit: &mut (dyn FnMut(String) + Send),
) -> Result<usize, DiscoveryError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut seen = HashSet::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_page_url(line) {
            Ok(url) => {
                let url = url.to_string();
                if seen.insert(url.clone()) {
                    emit(url);
                } else {
                    debug!(line = line_no, %url, "duplicate URL skipped");
                }
            }
            Err(reason) => warn!(line = line_no, "skipping '{line}': {reason}"),
        }
    }
    Ok(seen.len())
}

/// Passes through only URLs whose path the filter allows.
///
/// The entry URL, if set, bypasses the include globs so a run always
/// starts from it, but exclude globs still apply.
pub struct FilteredDiscovery {
    inner: Arc<dyn Discovery>,
    filter: PathFilter,
    entry: Option<Url>,
}

impl FilteredDiscovery {
    pub fn new(inner: Arc<dyn Discovery>, filter: PathFilter) -> Self {
        Self {
            inner,
            filter,
            entry: None,
        }
    }

    #[must_use]
    pub fn with_entry(mut self, entry: Url) -> Self {
        self.entry = Some(entry);
        self
    }

    fn allows(&self, url: &Url) -> bool {
        if self.entry.as_ref() == Some(url) {
            self.filter.allows_entry(url)
        } else {
            self.filter.allows(url)
        }
    }
}

#[async_trait]
impl Discovery for FilteredDiscovery {
    async fn discover(&self, emit: &mut (dyn FnMut(String) + Send)) -> Result<(), DiscoveryError> {
        let mut filtered = 0usize;
        let mut forward = |raw: String| match Url::parse(&raw) {
            Ok(url) if self.allows(&url) => emit(raw),
            Ok(_) => {
                debug!(url = %raw, "filtered out by path globs");
                filtered += 1;
            }
            Err(e) => warn!(url = %raw, "skipping invalid URL: {e}"),
        };
        self.inner.discover(&mut forward).await?;
        if filtered > 0 {
            info!(filtered, "URLs excluded by path globs");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect(discovery: &dyn Discovery) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        discovery
            .discover(&mut |url: String| urls.push(url))
            .await
            .unwrap();
        urls
    }

    #[tokio::test]
    async fn static_list_is_deduplicated_in_order() {
        let discovery =
            StaticDiscovery::parse(["https://b.example", "https://a.example/", "https://b.example/"])
                .unwrap();
        assert_eq!(
            collect(&discovery).await,
            ["https://b.example/", "https://a.example/"]
        );
    }

    #[test]
    fn static_list_rejects_bad_entries() {
        let err = StaticDiscovery::parse(["ftp://a.example/"]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidEntry { .. }));
        assert!(StaticDiscovery::parse(["not a url"]).is_err());
    }

    #[tokio::test]
    async fn reads_url_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# pages to audit\n\nhttps://a.example/\n  https://a.example/about  \nmailto:x@a.example\nnonsense\nhttps://a.example/"
        )
        .unwrap();

        let discovery = UrlFileDiscovery::new(file.path());
        assert!(!discovery.is_stdin());
        assert_eq!(
            collect(&discovery).await,
            ["https://a.example/", "https://a.example/about"]
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let discovery = UrlFileDiscovery::new("/nonexistent/urls.txt");
        let err = discovery.discover(&mut |_: String| {}).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(_)));
    }

    #[tokio::test]
    async fn filter_keeps_entry_and_matching_paths() {
        let inner = StaticDiscovery::parse([
            "https://a.example/",
            "https://a.example/blog/post",
            "https://a.example/blog/drafts",
            "https://a.example/shop/item",
        ])
        .unwrap();
        let filter = PathFilter::new(&["/blog/*".to_string()], &["/blog/drafts".to_string()])
            .unwrap();
        let discovery = FilteredDiscovery::new(Arc::new(inner), filter)
            .with_entry(Url::parse("https://a.example/").unwrap());

        assert_eq!(
            collect(&discovery).await,
            ["https://a.example/", "https://a.example/blog/post"]
        );
    }
}
