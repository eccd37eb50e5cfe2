// Relative markdown link extraction and resolution for link trails.

use std::sync::LazyLock;

use regex::Regex;

/// File extensions treated as markdown documents.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkd", "mkdn"];

/// Inline links: `[text](target "title")`.
static INLINE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+["'][^"']*["'])?\s*\)"#)
        .expect("inline link regex is valid")
});

/// Reference definitions: `[label]: target`.
static REFERENCE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s{0,3}\[[^\]]+\]:\s*<?([^\s>]+)>?").expect("reference link regex is valid")
});

pub fn is_markdown_path(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Same-repository links to markdown documents, in document order, without
/// duplicates. Anchors, absolute URLs and non-markdown targets are skipped;
/// fragments and query strings are stripped.
pub fn extract_markdown_links(content: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    let targets = INLINE_LINK_RE
        .captures_iter(content)
        .chain(REFERENCE_LINK_RE.captures_iter(content))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()));

    for target in targets {
        if let Some(link) = local_markdown_target(target)
            && !links.contains(&link)
        {
            links.push(link);
        }
    }

    links
}

fn local_markdown_target(target: &str) -> Option<String> {
    if target.starts_with('#') || target.starts_with("//") || has_scheme(target) {
        return None;
    }

    let path = target.split(['#', '?']).next()?;
    if path.is_empty() || !is_markdown_path(path) {
        return None;
    }

    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    Some(decoded)
}

/// `http:`, `mailto:` and friends: letters followed by a colon before any `/`.
fn has_scheme(target: &str) -> bool {
    match target.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Resolve `link` against the directory of `current_path`, POSIX style.
///
/// A leading `/` is relative to the repository root. Returns `None` when the
/// result would climb above the root or names no file.
pub fn resolve_relative(current_path: &str, link: &str) -> Option<String> {
    let mut parts: Vec<&str> = if link.starts_with('/') {
        Vec::new()
    } else {
        let mut dir: Vec<&str> = current_path.split('/').filter(|s| !s.is_empty()).collect();
        dir.pop();
        dir
    };

    for segment in link.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
