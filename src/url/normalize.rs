use crate::UrlError;
use url::Url;

/// Tracking query parameters that never change page content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "_ga"];

/// Normalizes a target URL into the canonical form used by the seen-target set
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host (done by the URL parser)
/// 3. Normalize the path: remove dot segments and duplicate slashes, drop a
///    trailing slash except for the root
/// 4. Remove the fragment
/// 5. Remove tracking query parameters, sort the remaining ones
///
/// Scheme and `www.` prefix are kept: a scraped site may serve different
/// content on either.
///
/// # Examples
///
/// ```
/// use record_trawler::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/a/../list/?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/list?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = parse_target_url(url_str)?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Parses a target URL exactly as given
///
/// Only the scheme and host are checked; the path, query and fragment are
/// left untouched so the page is fetched at the configured address.
pub fn parse_target_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}

/// Resolves an extracted link against the page it was found on
///
/// Returns None if the link should be excluded:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel: and data: links
/// - anything that is not HTTP(S) after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme_and_www() {
        let result = normalize_url("http://www.example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://www.example.com/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_tracking_params_removed_and_rest_sorted() {
        let result =
            normalize_url("https://example.com/list?page=2&utm_source=x&fbclid=1&asn=13335")
                .unwrap();
        assert_eq!(result.as_str(), "https://example.com/list?asn=13335&page=2");
    }

    #[test]
    fn test_dot_segments_and_duplicate_slashes() {
        let result = normalize_url("https://example.com//a/./b/../c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/c");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = normalize_url("https://EXAMPLE.COM/AS13335").unwrap();
        assert_eq!(result.as_str(), "https://example.com/AS13335");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_parse_target_url_keeps_address() {
        let raw = "https://example.com//list/?utm_source=x&b=2&a=1";
        let result = parse_target_url(raw).unwrap();
        assert_eq!(result.as_str(), raw);
        assert!(matches!(
            parse_target_url("ftp://example.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    fn base() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    #[test]
    fn test_resolve_relative_links() {
        assert_eq!(
            resolve_link("/other", &base()).unwrap().as_str(),
            "https://example.com/other"
        );
        assert_eq!(
            resolve_link("sibling", &base()).unwrap().as_str(),
            "https://example.com/dir/sibling"
        );
    }

    #[test]
    fn test_resolve_skips_special_links() {
        for href in [
            "",
            "#top",
            "javascript:void(0)",
            "mailto:noc@example.com",
            "tel:+15550100",
            "data:text/html,hi",
            "ftp://example.com/file",
        ] {
            assert!(resolve_link(href, &base()).is_none(), "{href}");
        }
    }
}
