//! Markup rewriting for generated HTML and RSS.
//!
//! Rendered bodies still point at the CMS's dynamic storage layer
//! (`/rails/active_storage/blobs/redirect/{token}/{filename}`), whose URLs are
//! signed, transient, and useless on a static host. [`ContentRewriter`]
//! replaces them with stable `/uploads/…` paths handed out by a
//! [`ReferenceResolver`] (the per-run [`BlobExporter`](crate::blobs::BlobExporter)).
//!
//! Rules, applied in order:
//!
//! 1. Dynamic-storage URLs → resolver result (fail-open: unresolved tokens
//!    keep their original URL).
//! 2. Absolute URLs into `/uploads/` → root-relative.
//! 3. `url="…"` on `<action-text-attachment>` embeds → resolver result.
//! 4. HTML only: `<img>` without a `loading` attribute gains
//!    `loading="lazy" decoding="async"`.
//! 5. Feed only: root-relative `src`/`href` values → absolute, prefixed with
//!    the site's base URL.
//!
//! Rewriting never fails. Input that matches no rule passes through
//! unchanged, and every rule is a fixed point so rewriting twice is the same
//! as rewriting once.

use regex::{Captures, Regex};

/// Maps an opaque storage token to a static path.
pub trait ReferenceResolver: Sync {
    /// Return the static path for `token`, or `original` if it cannot be resolved.
    fn resolve(&self, token: &str, original: &str) -> String;
}

/// Compiled rewrite rules for one storage path prefix.
pub struct RewritePatterns {
    storage_url: Regex,
    uploads_host: Regex,
    attachment: Regex,
    img_tag: Regex,
    feed_relative: Regex,
}

impl RewritePatterns {
    /// Compile the rules for a storage URL prefix such as `/rails/active_storage`.
    pub fn new(storage_path: &str) -> Result<Self, regex::Error> {
        let prefix = regex::escape(storage_path.trim_end_matches('/'));
        Ok(Self {
            // Group 1 is the token; variation keys and filenames follow it.
            storage_url: Regex::new(&format!(
                r#"(?:https?://[^/"'\s<>]+)?{prefix}/(?:blobs|representations)/(?:redirect/|proxy/)?([^/"'\s<>]+)/[^"'\s<>]+"#
            ))?,
            uploads_host: Regex::new(r#"https?://[^/"'\s<>]+(/uploads/[^"'\s<>]+)"#)?,
            attachment: Regex::new(
                r#"<action-text-attachment\b([^>]*?)\burl=(?:"([^"]*)"|'([^']*)')"#,
            )?,
            img_tag: Regex::new(r"(?i)<img\b([^>]*?)\s*(/?)>")?,
            feed_relative: Regex::new(r#"\b(src|href)=(?:"(/[^"]*)"|'(/[^']*)')"#)?,
        })
    }

    /// Whether `text` still contains a dynamic-storage URL.
    pub fn contains_storage_reference(&self, text: &str) -> bool {
        self.storage_url.is_match(text)
    }
}

pub struct ContentRewriter<'a> {
    patterns: &'a RewritePatterns,
    resolver: &'a dyn ReferenceResolver,
    base_url: String,
}

impl<'a> ContentRewriter<'a> {
    pub fn new(
        patterns: &'a RewritePatterns,
        resolver: &'a dyn ReferenceResolver,
        base_url: &str,
    ) -> Self {
        Self {
            patterns,
            resolver,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn rewrite_html(&self, markup: &str) -> String {
        let out = self.rewrite_common(markup);
        self.add_lazy_loading(&out)
    }

    pub fn rewrite_feed(&self, markup: &str) -> String {
        let out = self.rewrite_common(markup);
        self.absolutize(&out)
    }

    fn rewrite_common(&self, markup: &str) -> String {
        let out = self.replace_storage_urls(markup);
        let out = self
            .patterns
            .uploads_host
            .replace_all(&out, "$1")
            .into_owned();
        self.rewrite_attachments(&out)
    }

    fn replace_storage_urls(&self, text: &str) -> String {
        self.patterns
            .storage_url
            .replace_all(text, |caps: &Captures| self.resolver.resolve(&caps[1], &caps[0]))
            .into_owned()
    }

    fn rewrite_attachments(&self, text: &str) -> String {
        self.patterns
            .attachment
            .replace_all(text, |caps: &Captures| {
                let (url, quote) = match (caps.get(2), caps.get(3)) {
                    (Some(m), _) => (m.as_str(), '"'),
                    (None, Some(m)) => (m.as_str(), '\''),
                    (None, None) => return caps[0].to_string(),
                };
                if url.starts_with("/uploads/") {
                    return caps[0].to_string();
                }
                let resolved = match self.patterns.storage_url.captures(url) {
                    Some(inner) => self.resolver.resolve(&inner[1], url),
                    None => return caps[0].to_string(),
                };
                format!(
                    "<action-text-attachment{}url={quote}{resolved}{quote}",
                    &caps[1]
                )
            })
            .into_owned()
    }

    fn add_lazy_loading(&self, text: &str) -> String {
        self.patterns
            .img_tag
            .replace_all(text, |caps: &Captures| {
                let attrs = &caps[1];
                let lower = attrs.to_ascii_lowercase();
                if lower.contains("loading=") {
                    return caps[0].to_string();
                }
                let mut tag = format!("<img{attrs} loading=\"lazy\"");
                if !lower.contains("decoding=") {
                    tag.push_str(" decoding=\"async\"");
                }
                if &caps[2] == "/" {
                    tag.push_str(" /");
                }
                tag.push('>');
                tag
            })
            .into_owned()
    }

    fn absolutize(&self, text: &str) -> String {
        self.patterns
            .feed_relative
            .replace_all(text, |caps: &Captures| {
                let (path, quote) = match (caps.get(2), caps.get(3)) {
                    (Some(m), _) => (m.as_str(), '"'),
                    (None, Some(m)) => (m.as_str(), '\''),
                    (None, None) => return caps[0].to_string(),
                };
                // Protocol-relative URLs are already absolute.
                if path.starts_with("//") {
                    return caps[0].to_string();
                }
                format!("{}={quote}{}{path}{quote}", &caps[1], self.base_url)
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Resolves known tokens, records every call.
    struct MapResolver {
        known: HashMap<&'static str, &'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl MapResolver {
        fn new(pairs: &[(&'static str, &'static str)]) -> Self {
            Self {
                known: pairs.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReferenceResolver for MapResolver {
        fn resolve(&self, token: &str, original: &str) -> String {
            self.calls.lock().unwrap().push(token.to_string());
            self.known
                .get(token)
                .map(|p| p.to_string())
                .unwrap_or_else(|| original.to_string())
        }
    }

    fn patterns() -> RewritePatterns {
        RewritePatterns::new("/rails/active_storage").unwrap()
    }

    const CAT: &str = "/uploads/12-cat.jpg";

    // =========================================================================
    // Storage URL replacement
    // =========================================================================

    #[test]
    fn replaces_relative_blob_redirect_url() {
        let p = patterns();
        let r = MapResolver::new(&[("eyJfcmFpbHMi--abc", CAT)]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_html(
            r#"<img src="/rails/active_storage/blobs/redirect/eyJfcmFpbHMi--abc/cat.jpg" loading="eager">"#,
        );
        assert_eq!(out, r#"<img src="/uploads/12-cat.jpg" loading="eager">"#);
    }

    #[test]
    fn replaces_absolute_representation_url() {
        let p = patterns();
        let r = MapResolver::new(&[("tok", CAT)]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_feed(
            "see https://cms.example:3000/rails/active_storage/representations/redirect/tok/variant-key/cat.jpg here",
        );
        assert_eq!(out, "see /uploads/12-cat.jpg here");
    }

    #[test]
    fn unresolved_token_keeps_original_url() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let input = r#"<a href="/rails/active_storage/blobs/redirect/missing/doc.pdf">doc</a>"#;
        assert_eq!(rw.rewrite_html(input), input);
        assert_eq!(*r.calls.lock().unwrap(), vec!["missing".to_string()]);
    }

    #[test]
    fn custom_storage_path_is_escaped() {
        let p = RewritePatterns::new("/media.store/").unwrap();
        let r = MapResolver::new(&[("t1", CAT)]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        assert_eq!(rw.rewrite_feed("/media.store/blobs/t1/cat.jpg"), CAT);
        // '.' must not match any character
        assert_eq!(
            rw.rewrite_feed("/mediaXstore/blobs/t1/cat.jpg"),
            "/mediaXstore/blobs/t1/cat.jpg"
        );
    }

    // =========================================================================
    // Host normalization and attachments
    // =========================================================================

    #[test]
    fn absolute_upload_urls_become_root_relative() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_feed(r#"<img src="http://localhost:3000/uploads/3-a.png">"#);
        assert_eq!(out, r#"<img src="https://blog.example/uploads/3-a.png">"#);

        let html = rw.rewrite_html(r#"<a href="https://old.host/uploads/3-a.png">x</a>"#);
        assert_eq!(html, r#"<a href="/uploads/3-a.png">x</a>"#);
    }

    #[test]
    fn attachment_url_attribute_is_resolved() {
        let p = patterns();
        let r = MapResolver::new(&[("tok9", CAT)]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_attachments(
            r#"<action-text-attachment content-type="image/jpeg" url='/rails/active_storage/blobs/tok9/cat.jpg?disposition=inline'>"#,
        );
        assert_eq!(
            out,
            r#"<action-text-attachment content-type="image/jpeg" url='/uploads/12-cat.jpg'>"#
        );
    }

    #[test]
    fn attachment_already_on_uploads_is_untouched() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let input = r#"<action-text-attachment url="/uploads/1-a.jpg" caption="x">"#;
        assert_eq!(rw.rewrite_attachments(input), input);
        assert!(r.calls.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Lazy loading (HTML only)
    // =========================================================================

    #[test]
    fn lazy_loading_added_once() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let once = rw.rewrite_html(r#"<p><IMG src="/a.png" alt="a"/></p>"#);
        assert_eq!(
            once,
            r#"<p><img src="/a.png" alt="a" loading="lazy" decoding="async" /></p>"#
        );
        assert_eq!(rw.rewrite_html(&once), once);
    }

    #[test]
    fn existing_loading_hint_respected() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let input = r#"<img loading="eager" src="/hero.png">"#;
        assert_eq!(rw.rewrite_html(input), input);
    }

    #[test]
    fn existing_decoding_hint_not_duplicated() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_html(r#"<img src="/a.png" decoding="sync">"#);
        assert_eq!(out, r#"<img src="/a.png" decoding="sync" loading="lazy">"#);
    }

    #[test]
    fn feed_gets_no_lazy_loading() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let out = rw.rewrite_feed(r#"<img src="https://cdn.example/a.png">"#);
        assert!(!out.contains("loading="));
    }

    // =========================================================================
    // Feed absolutization
    // =========================================================================

    #[test]
    fn feed_relative_paths_become_absolute() {
        let p = patterns();
        let r = MapResolver::new(&[("tok", CAT)]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example/");
        let out = rw.rewrite_feed(
            r#"<![CDATA[<a href='/hello.html'><img src="/rails/active_storage/blobs/redirect/tok/cat.jpg"></a>]]>"#,
        );
        assert_eq!(
            out,
            r#"<![CDATA[<a href='https://blog.example/hello.html'><img src="https://blog.example/uploads/12-cat.jpg"></a>]]>"#
        );
        assert_eq!(rw.rewrite_feed(&out), out);
    }

    #[test]
    fn feed_protocol_relative_untouched() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let input = r#"<img src="//cdn.example/a.png">"#;
        assert_eq!(rw.rewrite_feed(input), input);
    }

    #[test]
    fn malformed_markup_passes_through() {
        let p = patterns();
        let r = MapResolver::new(&[]);
        let rw = ContentRewriter::new(&p, &r, "https://blog.example");
        let input = "<img src=\"/rails/active_storage/blobs/ <<< >>> </action-text-attachment";
        let _ = rw.rewrite_html(input);
        let _ = rw.rewrite_feed(input);
    }

    #[test]
    fn contains_storage_reference_detects_leaks() {
        let p = patterns();
        assert!(p.contains_storage_reference("x /rails/active_storage/blobs/redirect/t/f.jpg"));
        assert!(!p.contains_storage_reference("x /uploads/1-f.jpg"));
    }
}
