//! Just enough HTML handling to find a site's about/legal pages and hand
//! their text to an extractor.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use url::Url;

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid link selector"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

const ABOUT_KEYWORDS: &[&str] = &["about", "contact", "team", "leadership", "management", "owner", "founder"];
const LEGAL_KEYWORDS: &[&str] = &["terms", "privacy", "legal", "imprint", "policy"];
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
    })
}

/// Visible text below `root`, entity-decoded, with whitespace collapsed.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    collapse(&parts.join(" "))
}

/// `(href, anchor text)` for every link in document order.
pub(crate) fn extract_links(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&LINK)
        .filter(|a| !is_hidden(a))
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            Some((href.to_string(), collapse(&a.text().collect::<Vec<_>>().join(" "))))
        })
        .collect()
}

/// Visible text with scripts and styles removed and whitespace collapsed.
pub(crate) fn clean_text(html: &str) -> String {
    visible_text(Html::parse_document(html).root_element())
}

fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_lowercase())
}

/// Same-site links that look like about/team pages and legal pages,
/// deduplicated in first-seen order.
pub(crate) fn find_candidate_pages(base: &Url, html: &str) -> (Vec<String>, Vec<String>) {
    let base_host = bare_host(base);
    let mut about: Vec<String> = Vec::new();
    let mut legal: Vec<String> = Vec::new();

    for (href, text) in extract_links(html) {
        if href.starts_with("mailto:") || href.starts_with("tel:") || href.starts_with('#') {
            continue;
        }
        let Ok(absolute) = base.join(&href) else {
            continue;
        };
        if base_host.is_some() && bare_host(&absolute) != base_host {
            continue;
        }
        let combined = format!("{} {}", href, text).to_lowercase();
        let link = absolute.to_string();
        if ABOUT_KEYWORDS.iter().any(|k| combined.contains(k)) && !about.contains(&link) {
            about.push(link.clone());
        }
        if LEGAL_KEYWORDS.iter().any(|k| combined.contains(k)) && !legal.contains(&link) {
            legal.push(link);
        }
    }
    (about, legal)
}

/// Truncates on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOMEPAGE: &str = r#"
        <html><head><style>.x { color: red }</style><script>var a = "<a href='/evil'>";</script></head>
        <body>
          <a href="/about-us">About Us</a>
          <a class="nav" href='https://www.acme.com/team'>Our <b>Team</b></a>
          <a href="/about-us">About again</a>
          <a href="https://other.com/about">Partner</a>
          <a href="mailto:hi@acme.com">Email</a>
          <a href="/legal/terms">Terms &amp; Conditions</a>
          <a href="/privacy">Privacy</a>
          <a href="/shop">Shop</a>
        </body></html>"#;

    #[test]
    fn test_candidate_pages_are_same_site_and_deduplicated() {
        let base = Url::parse("https://acme.com/").unwrap();
        let (about, legal) = find_candidate_pages(&base, HOMEPAGE);
        assert_eq!(about, vec!["https://acme.com/about-us", "https://www.acme.com/team"]);
        assert_eq!(legal, vec!["https://acme.com/legal/terms", "https://acme.com/privacy"]);
    }

    #[test]
    fn test_unquoted_hrefs_are_found() {
        let base = Url::parse("https://acme.com/").unwrap();
        let (about, legal) = find_candidate_pages(&base, "<a href=/about-us>About</a><a href=/terms>Terms</a>");
        assert_eq!(about, vec!["https://acme.com/about-us"]);
        assert_eq!(legal, vec!["https://acme.com/terms"]);
    }

    #[test]
    fn test_clean_text_strips_markup() {
        let text = clean_text("<p>Founded by <b>Jane&nbsp;Doe</b>,\n\n owner.</p><script>x()</script><style>p{}</style>");
        assert_eq!(text, "Founded by Jane Doe , owner.");
    }

    #[test]
    fn test_clean_text_decodes_entities() {
        let text = clean_text("<p>Jos&eacute; O&#8217;Neil &mdash; Owner</p>");
        assert_eq!(text, "Jos\u{e9} O\u{2019}Neil \u{2014} Owner");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
