//! Website and domain normalization for lookup inputs.

use crate::core::error::{AppError, Result};
use url::Url;

fn with_scheme(input: &str) -> String {
    if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    }
}

/// Parses a website field into a URL, adding `https://` when the scheme is missing.
pub(crate) fn normalize_website(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Input("Website value is empty".to_string()));
    }

    let url = Url::parse(&with_scheme(trimmed))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => {
            tracing::debug!("Website '{}' has no host component", trimmed);
            Err(AppError::UrlParse(url::ParseError::EmptyHost))
        }
    }
}

/// Extracts the bare lowercase domain ("example.com") from a URL or domain string.
///
/// Strips a leading `www.` and rejects hosts without a dot or with a
/// leading/trailing dot.
pub(crate) fn domain_from_website(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction(
            "Input string is empty".to_string(),
        ));
    }

    let host = match Url::parse(&with_scheme(trimmed)) {
        Ok(url) => url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::DomainExtraction(format!("No host in '{}'", trimmed)))?,
        Err(e) => {
            // Bare domains with odd characters still work as plain hosts.
            if !trimmed.contains('/') && trimmed.contains('.') {
                trimmed.to_string()
            } else {
                return Err(AppError::UrlParse(e));
            }
        }
    };

    let domain = host
        .strip_prefix("www.")
        .unwrap_or(&host)
        .to_lowercase();

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(AppError::DomainExtraction(format!(
            "Extracted domain appears invalid: {}",
            domain
        )));
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_website_valid() {
        assert_eq!(domain_from_website("https://www.example.com").unwrap(), "example.com");
        assert_eq!(domain_from_website("http://example.com").unwrap(), "example.com");
        assert_eq!(domain_from_website("example.com").unwrap(), "example.com");
        assert_eq!(domain_from_website("www.Example.COM").unwrap(), "example.com");
        assert_eq!(
            domain_from_website("https://EXAMPLE.com/contact?x=1").unwrap(),
            "example.com"
        );
        assert_eq!(domain_from_website("http://example.com:8080").unwrap(), "example.com");
        assert_eq!(
            domain_from_website(" sub.example.co.uk ").unwrap(),
            "sub.example.co.uk"
        );
    }

    #[test]
    fn test_domain_from_website_invalid() {
        assert!(domain_from_website("").is_err());
        assert!(domain_from_website("   ").is_err());
        assert!(domain_from_website("https://").is_err());
        assert!(domain_from_website("www.").is_err());
        assert!(domain_from_website(".com").is_err());
        assert!(domain_from_website("localhost").is_err());
    }

    #[test]
    fn test_normalize_website() {
        assert_eq!(normalize_website("acme.io").unwrap().as_str(), "https://acme.io/");
        assert_eq!(
            normalize_website("http://acme.io/about").unwrap().as_str(),
            "http://acme.io/about"
        );
        assert!(normalize_website("").is_err());
        assert!(normalize_website("https://").is_err());
    }
}
