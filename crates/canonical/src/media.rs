//! Host-based media policies.
//!
//! The sender insists that every image is served from its CDN; the receiver
//! insists that every referenced media host is on its allowlist. Both compare
//! lowercase hosts parsed with the `url` crate.

use url::Url;

use crate::error::CanonicalError;

/// Lowercase host of an absolute or protocol-relative URL.
///
/// ```
/// use canonical::host_of;
///
/// assert_eq!(host_of("https://CDN.Example/a.jpg").as_deref(), Some("cdn.example"));
/// assert_eq!(host_of("//cdn.example/a.jpg").as_deref(), Some("cdn.example"));
/// assert_eq!(host_of("/relative/a.jpg"), None);
/// ```
pub fn host_of(url: &str) -> Option<String> {
    let url = url.trim();
    let parsed = if url.starts_with("//") {
        Url::parse(&format!("https:{url}"))
    } else {
        Url::parse(url)
    };
    parsed
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Distinct hosts in first-seen order.
pub fn host_list<'a, I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hosts: Vec<String> = Vec::new();
    for host in urls.into_iter().filter_map(host_of) {
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts
}

/// Require every absolute image URL to live on the CDN host.
///
/// Relative URLs carry no host and are not checked.
pub fn enforce_cdn_hosts<'a, I>(urls: I, cdn_base: &str) -> Result<(), CanonicalError>
where
    I: IntoIterator<Item = &'a str>,
{
    let cdn_host = host_of(cdn_base).ok_or(CanonicalError::CdnBaseMissing)?;
    for url in urls {
        if let Some(host) = host_of(url) {
            if host != cdn_host {
                return Err(CanonicalError::NonCdnUrl {
                    url: url.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Require every media URL's host to be on `allowlist`.
///
/// An empty allowlist rejects everything, including payloads without media;
/// hostless URLs are rejected too.
pub fn enforce_media_domains<'a, I>(urls: I, allowlist: &[String]) -> Result<(), CanonicalError>
where
    I: IntoIterator<Item = &'a str>,
{
    let allowed: Vec<String> = allowlist
        .iter()
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    if allowed.is_empty() {
        return Err(CanonicalError::MediaDomainNotAllowed { url: String::new() });
    }
    for url in urls {
        match host_of(url) {
            Some(host) if allowed.contains(&host) => {}
            _ => {
                return Err(CanonicalError::MediaDomainNotAllowed {
                    url: url.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Order-preserving de-duplication of non-empty URLs.
pub fn unique_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|u| !u.trim().is_empty())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_list_is_unique_and_ordered() {
        let hosts = host_list([
            "https://b.example/1",
            "https://A.example/2",
            "https://b.example/3",
            "relative.jpg",
        ]);
        assert_eq!(hosts, ["b.example", "a.example"]);
    }

    #[test]
    fn cdn_enforcement() {
        let cdn = "https://cdn.example/";
        assert!(enforce_cdn_hosts(["https://cdn.example/a.jpg", "/local.jpg"], cdn).is_ok());
        assert_eq!(
            enforce_cdn_hosts(["https://origin.example/a.jpg"], cdn),
            Err(CanonicalError::NonCdnUrl {
                url: "https://origin.example/a.jpg".into()
            })
        );
        assert_eq!(
            enforce_cdn_hosts(["https://cdn.example/a.jpg"], ""),
            Err(CanonicalError::CdnBaseMissing)
        );
        assert_eq!(
            enforce_cdn_hosts(std::iter::empty(), "not a url"),
            Err(CanonicalError::CdnBaseMissing)
        );
    }

    #[test]
    fn media_domain_enforcement() {
        let allow = vec!["cdn.example".to_string(), " Img.Example ".to_string()];
        assert!(enforce_media_domains(
            ["https://cdn.example/a.jpg", "https://img.example/b.jpg"],
            &allow
        )
        .is_ok());
        assert!(enforce_media_domains(["https://evil.example/a.jpg"], &allow).is_err());
        assert!(enforce_media_domains(["/relative.jpg"], &allow).is_err());
        assert!(enforce_media_domains(std::iter::empty(), &[]).is_err());
    }

    #[test]
    fn unique_urls_keeps_first_occurrence() {
        let urls = unique_urls(["a".to_string(), "b".into(), "a".into(), "".into()]);
        assert_eq!(urls, ["a", "b"]);
    }
}
