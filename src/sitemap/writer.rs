// src/sitemap/writer.rs
// =============================================================================
// Renders valid URLs as a sitemap file.
//
// Output looks like:
//
//   <?xml version="1.0" encoding="UTF-8"?>
//   <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//       <url>
//           <loc>https://example.com/catalog/</loc>
//           <lastmod>2024-05-01</lastmod>
//           <priority>1.0</priority>
//       </url>
//       ...
//   </urlset>
//
// URLs come out sorted (they arrive as a BTreeSet). The catalog page itself
// gets priority 1.0, every filter page 0.8.
// =============================================================================

use chrono::{Local, NaiveDate};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cache::{Cache, CacheError};

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const INDENT: &str = "    ";

#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    #[error("failed to write sitemap {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Renders the sitemap XML for `urls`, stamped with `today`.
pub fn render_sitemap(urls: &BTreeSet<String>, base_url: &str, today: NaiveDate) -> String {
    let lastmod = today.format("%Y-%m-%d").to_string();
    let base = base_url.trim_end_matches('/');

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{}\">\n", SITEMAP_NS));

    for url in urls {
        let priority = if url.trim_end_matches('/') == base {
            "1.0"
        } else {
            "0.8"
        };
        // Writing into a String cannot fail
        let _ = write!(
            xml,
            "{i}<url>\n\
             {i}{i}<loc>{loc}</loc>\n\
             {i}{i}<lastmod>{lastmod}</lastmod>\n\
             {i}{i}<priority>{priority}</priority>\n\
             {i}</url>\n",
            i = INDENT,
            loc = html_escape::encode_text(url),
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

/// Writes the sitemap for `urls` to `path`, dated today.
pub fn write_sitemap(
    path: &Path,
    urls: &BTreeSet<String>,
    base_url: &str,
) -> Result<(), SitemapError> {
    let xml = render_sitemap(urls, base_url, Local::now().date_naive());
    std::fs::write(path, xml).map_err(|source| SitemapError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), urls = urls.len(), "sitemap written");
    Ok(())
}

/// Builds the sitemap from the valid, still fresh entries of a cache file.
///
/// Returns how many URLs were written.
pub fn sitemap_from_cache(
    cache_path: &Path,
    output: &Path,
    base_url: &str,
    ttl: Duration,
) -> Result<usize, SitemapError> {
    let cache = Cache::new(cache_path, ttl);
    cache.load()?;

    let urls = cache.valid_urls();
    info!(
        cache = %cache.path().display(),
        entries = cache.len(),
        valid = urls.len(),
        "building sitemap from cache"
    );

    write_sitemap(output, &urls, base_url)?;
    Ok(urls.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn urls(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn test_render_layout() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let xml = render_sitemap(
            &urls(&["https://ex.com/cat", "https://ex.com/cat/red/"]),
            "https://ex.com/cat",
            today,
        );

        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n    \
<url>\n        \
<loc>https://ex.com/cat</loc>\n        \
<lastmod>2024-05-01</lastmod>\n        \
<priority>1.0</priority>\n    \
</url>\n    \
<url>\n        \
<loc>https://ex.com/cat/red/</loc>\n        \
<lastmod>2024-05-01</lastmod>\n        \
<priority>0.8</priority>\n    \
</url>\n\
</urlset>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_render_escapes_and_sorts() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let xml = render_sitemap(
            &urls(&["https://ex.com/z/", "https://ex.com/a&b/"]),
            "https://ex.com",
            today,
        );

        assert!(xml.contains("<loc>https://ex.com/a&amp;b/</loc>"));
        let a = xml.find("a&amp;b").unwrap();
        let z = xml.find("/z/").unwrap();
        assert!(a < z);
    }

    #[test]
    fn test_render_empty() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let xml = render_sitemap(&BTreeSet::new(), "https://ex.com", today);
        assert!(!xml.contains("<url>"));
        assert!(xml.ends_with("</urlset>\n"));
    }

    #[test]
    fn test_write_sitemap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sitemap.xml");

        let found = urls(&["https://ex.com/cat/red/"]);
        write_sitemap(&path, &found, "https://ex.com/cat").unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<loc>https://ex.com/cat/red/</loc>"));
        assert!(written.contains("<priority>0.8</priority>"));
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("sitemap.xml");

        let result = write_sitemap(&path, &BTreeSet::new(), "https://ex.com");
        assert!(matches!(result, Err(SitemapError::Write { .. })));
    }

    #[test]
    fn test_sitemap_from_cache() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        let output = dir.path().join("sitemap.xml");

        let cache = Cache::new(&cache_path, Duration::from_secs(3600));
        cache.set("https://ex.com/cat/red/", true);
        cache.set("https://ex.com/cat/blue/", false);
        cache.save().unwrap();

        let ttl = Duration::from_secs(3600);
        let written = sitemap_from_cache(&cache_path, &output, "https://ex.com/cat", ttl).unwrap();
        assert_eq!(written, 1);

        let xml = std::fs::read_to_string(&output).unwrap();
        assert!(xml.contains("/cat/red/"));
        assert!(!xml.contains("/cat/blue/"));
    }

    #[test]
    fn test_sitemap_from_missing_cache_is_empty() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("sitemap.xml");

        let written = sitemap_from_cache(
            &dir.path().join("absent.json"),
            &output,
            "https://ex.com",
            Duration::from_secs(3600),
        )
        .unwrap();
        assert_eq!(written, 0);
        assert!(output.exists());
    }
}
