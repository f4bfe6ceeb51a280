//! Output tree naming.
//!
//! Every relative path and public URL the pipeline produces comes from here,
//! so the writer, the cleaner, the sitemap and the deploy publish list agree
//! on one layout:
//!
//! ```text
//! index.html                       page/{n}.html
//! {prefix/}{slug}.html             pages/{slug}.html
//! tags/index.html                  tags/{slug}.html
//! tags/{slug}/page/{n}.html        uploads/{asset-id}-{filename}
//! feed.xml  sitemap.xml  search.html  search.json
//! ```

use std::path::{Component, Path};

pub const UPLOADS_DIR: &str = "uploads";
pub const STATIC_DIR: &str = "static";
pub const ASSETS_DIR: &str = "assets";
pub const INDEX_FILE: &str = "index.html";
pub const FEED_FILE: &str = "feed.xml";
pub const SITEMAP_FILE: &str = "sitemap.xml";
pub const SEARCH_HTML: &str = "search.html";
pub const SEARCH_JSON: &str = "search.json";
pub const TAGS_INDEX: &str = "tags/index.html";
pub const NETLIFY_REDIRECTS: &str = "_redirects";
pub const HTACCESS: &str = ".htaccess";
pub const REDIRECTS_JS: &str = "redirects.js";

/// Root pages served by the web host that are never generated or cleaned.
pub const ERROR_PAGES: &[&str] = &["400.html", "404.html", "422.html", "500.html"];

pub fn article_path(slug: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("{}/{slug}.html", p.trim_matches('/')),
        None => format!("{slug}.html"),
    }
}

pub fn article_url(slug: &str, prefix: Option<&str>) -> String {
    format!("/{}", article_path(slug, prefix))
}

pub fn page_path(slug: &str) -> String {
    format!("pages/{slug}.html")
}

pub fn page_url(slug: &str) -> String {
    format!("/{}", page_path(slug))
}

pub fn index_page_path(n: usize) -> String {
    format!("page/{n}.html")
}

/// Page 1 is served from the root.
pub fn index_page_url(n: usize) -> String {
    if n <= 1 {
        "/".to_string()
    } else {
        format!("/{}", index_page_path(n))
    }
}

pub fn tag_path(slug: &str) -> String {
    format!("tags/{slug}.html")
}

pub fn tag_page_path(slug: &str, n: usize) -> String {
    format!("tags/{slug}/page/{n}.html")
}

pub fn tag_page_url(slug: &str, n: usize) -> String {
    if n <= 1 {
        format!("/{}", tag_path(slug))
    } else {
        format!("/{}", tag_page_path(slug, n))
    }
}

/// `{asset-id}-{filename}` with the filename reduced to safe characters.
pub fn upload_filename(id: u64, filename: &str) -> String {
    format!("{id}-{}", sanitize_filename(filename))
}

pub fn upload_url(file_name: &str) -> String {
    format!("/{UPLOADS_DIR}/{file_name}")
}

/// Keep the basename and replace anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Output file for an HTML redirect page at a site path (`/old` → `old.html`).
pub fn redirect_page_path(site_path: &str) -> String {
    let trimmed = site_path.trim_start_matches('/');
    if trimmed.is_empty() {
        INDEX_FILE.to_string()
    } else if trimmed.ends_with(".html") {
        trimmed.to_string()
    } else {
        format!("{trimmed}.html")
    }
}

/// A relative path that stays inside the output tree.
pub fn is_safe_relative(rel: &str) -> bool {
    if rel.is_empty() || rel.contains('\\') || rel.contains('\0') {
        return false;
    }
    Path::new(rel)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

/// A slug usable as a single path segment.
pub fn is_safe_segment(slug: &str) -> bool {
    !slug.is_empty() && !slug.contains('/') && is_safe_relative(slug) && !slug.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_paths_with_and_without_prefix() {
        assert_eq!(article_path("hello", None), "hello.html");
        assert_eq!(article_path("hello", Some("posts")), "posts/hello.html");
        assert_eq!(article_path("hello", Some("/posts/")), "posts/hello.html");
        assert_eq!(article_url("hello", None), "/hello.html");
    }

    #[test]
    fn pagination_urls() {
        assert_eq!(index_page_url(1), "/");
        assert_eq!(index_page_url(3), "/page/3.html");
        assert_eq!(tag_page_url("rust", 1), "/tags/rust.html");
        assert_eq!(tag_page_url("rust", 2), "/tags/rust/page/2.html");
        assert_eq!(tag_page_path("rust", 2), "tags/rust/page/2.html");
    }

    #[test]
    fn upload_filename_is_id_prefixed_and_sanitized() {
        assert_eq!(upload_filename(42, "cat.jpg"), "42-cat.jpg");
        assert_eq!(upload_filename(7, "My Photo (1).png"), "7-My_Photo__1_.png");
        assert_eq!(upload_filename(3, "../../etc/passwd"), "3-passwd");
        assert_eq!(upload_filename(9, ".hidden"), "9-hidden");
        assert_eq!(upload_filename(1, ""), "1-file");
    }

    #[test]
    fn redirect_page_paths() {
        assert_eq!(redirect_page_path("/"), "index.html");
        assert_eq!(redirect_page_path("/old-post"), "old-post.html");
        assert_eq!(redirect_page_path("/tags/x.html"), "tags/x.html");
    }

    #[test]
    fn safe_relative_rejects_escapes() {
        assert!(is_safe_relative("a/b.html"));
        assert!(!is_safe_relative("../a.html"));
        assert!(!is_safe_relative("a/../../b"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative("./a"));
        assert!(!is_safe_relative(""));
        assert!(!is_safe_relative("a\\b"));
    }

    #[test]
    fn safe_segment() {
        assert!(is_safe_segment("hello-world"));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment(".env"));
        assert!(!is_safe_segment(""));
    }
}
