//! Rendering logical pages to markup.
//!
//! The orchestrator never builds markup itself. It describes each artifact as
//! a [`View`] (template name plus typed bindings) and hands it to a
//! [`Renderer`]. Rendering must be free of side effects; the orchestrator
//! calls it from several threads at once.
//!
//! [`HtmlRenderer`] is the stock implementation. It uses
//! [maud](https://maud.lambda.xyz/) for HTML and for the RSS 2.0 and sitemap
//! XML. Article bodies are already-rendered rich text and are embedded
//! unescaped; everything else is escaped by maud.

use crate::config::SiteSection;
use crate::paths;
use crate::types::{Article, Page, Tag};
use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template {template} failed: {message}")]
    Template {
        template: &'static str,
        message: String,
    },
}

/// Which paginated listing a [`Pagination`] belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Index,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub listing: Listing,
    /// 1-based.
    pub current: usize,
    pub total: usize,
}

impl Pagination {
    pub fn url_for(&self, n: usize) -> String {
        match &self.listing {
            Listing::Index => paths::index_page_url(n),
            Listing::Tag(slug) => paths::tag_page_url(slug, n),
        }
    }

    pub fn prev_url(&self) -> Option<String> {
        (self.current > 1).then(|| self.url_for(self.current - 1))
    }

    pub fn next_url(&self) -> Option<String> {
        (self.current < self.total).then(|| self.url_for(self.current + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    /// Absolute URL.
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// Template bindings for one artifact.
#[derive(Debug, Clone)]
pub enum View<'a> {
    Article {
        article: &'a Article,
        tags: Vec<&'a Tag>,
    },
    Page {
        page: &'a Page,
    },
    Index {
        articles: Vec<&'a Article>,
        pagination: Pagination,
    },
    TagsIndex {
        /// Tag with its published-article count.
        tags: Vec<(&'a Tag, usize)>,
    },
    Tag {
        tag: &'a Tag,
        articles: Vec<&'a Article>,
        pagination: Pagination,
    },
    Search,
    Redirect {
        target: String,
        permanent: bool,
    },
    Feed {
        articles: Vec<&'a Article>,
    },
    Sitemap {
        entries: &'a [SitemapEntry],
    },
}

impl View<'_> {
    /// Logical template name, used in logs and errors.
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Article { .. } => "articles/show",
            Self::Page { .. } => "pages/show",
            Self::Index { .. } => "articles/index",
            Self::TagsIndex { .. } => "tags/index",
            Self::Tag { .. } => "tags/show",
            Self::Search => "search/show",
            Self::Redirect { .. } => "redirects/static_redirect",
            Self::Feed { .. } => "feed/rss",
            Self::Sitemap { .. } => "sitemap/index",
        }
    }
}

/// Produces markup for a [`View`].
pub trait Renderer: Send + Sync {
    fn render(&self, view: &View<'_>) -> Result<String, RenderError>;
}

/// Stock maud-based renderer.
pub struct HtmlRenderer {
    site: SiteSection,
}

impl HtmlRenderer {
    pub fn new(site: SiteSection) -> Self {
        Self { site }
    }

    fn article_url(&self, article: &Article) -> String {
        paths::article_url(&article.slug, self.site.article_route_prefix.as_deref())
    }

    fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.site.base_url(), path)
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, view: &View<'_>) -> Result<String, RenderError> {
        let markup = match view {
            View::Article { article, tags } => self.render_article(article, tags),
            View::Page { page } => self.render_page(page),
            View::Index {
                articles,
                pagination,
            } => self.render_index(articles, pagination),
            View::TagsIndex { tags } => self.render_tags_index(tags),
            View::Tag {
                tag,
                articles,
                pagination,
            } => self.render_tag(tag, articles, pagination),
            View::Search => self.render_search(),
            View::Redirect { target, permanent } => render_redirect(target, *permanent),
            View::Feed { articles } => self.render_feed(articles),
            View::Sitemap { entries } => render_sitemap(entries),
        };
        Ok(markup.into_string())
    }
}

// ============================================================================
// HTML Components
// ============================================================================

const SEARCH_JS: &str = r#"(function () {
  var input = document.getElementById('search-input');
  var list = document.getElementById('search-results');
  var index = [];
  fetch('/search.json').then(function (r) { return r.json(); }).then(function (d) { index = d; });
  input.addEventListener('input', function () {
    var q = input.value.trim().toLowerCase();
    list.innerHTML = '';
    if (!q) { return; }
    index.filter(function (e) {
      return (e.title + ' ' + e.description + ' ' + e.tags.join(' ') + ' ' + e.content)
        .toLowerCase().indexOf(q) !== -1;
    }).slice(0, 20).forEach(function (e) {
      var li = document.createElement('li');
      var a = document.createElement('a');
      a.href = e.url;
      a.textContent = e.title;
      li.appendChild(a);
      list.appendChild(li);
    });
  });
})();"#;

fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

impl HtmlRenderer {
    /// Renders the base HTML document structure
    fn base_document(&self, title: &str, description: Option<&str>, content: Markup) -> Markup {
        let full_title = if title == self.site.title {
            title.to_string()
        } else {
            format!("{title} · {}", self.site.title)
        };
        html! {
            (DOCTYPE)
            html lang=(self.site.language) {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (full_title) }
                    @if let Some(d) = description.filter(|d| !d.is_empty()) {
                        meta name="description" content=(d);
                    }
                    @if let Some(css) = &self.site.stylesheet {
                        link rel="stylesheet" href=(css);
                    }
                    link rel="alternate" type="application/rss+xml" title=(self.site.title) href={ "/" (paths::FEED_FILE) };
                    script src={ "/" (paths::REDIRECTS_JS) } defer {}
                }
                body {
                    header.site-header {
                        a.site-title href="/" { (self.site.title) }
                        nav.site-nav {
                            a href="/" { "Home" }
                            a href={ "/" (paths::TAGS_INDEX) } { "Tags" }
                            a href={ "/" (paths::SEARCH_HTML) } { "Search" }
                        }
                    }
                    main { (content) }
                    footer.site-footer {
                        a href={ "/" (paths::FEED_FILE) } { "RSS" }
                    }
                }
            }
        }
    }

    fn article_summary(&self, article: &Article) -> Markup {
        html! {
            li.post-summary {
                a href=(self.article_url(article)) { (article.title) }
                " "
                time datetime=(article.created_at.to_rfc3339()) { (format_date(&article.created_at)) }
                @if !article.description.is_empty() {
                    p.post-description { (article.description) }
                }
            }
        }
    }

    fn pagination_nav(&self, pagination: &Pagination) -> Markup {
        html! {
            @if pagination.total > 1 {
                nav.pagination {
                    @if let Some(prev) = pagination.prev_url() {
                        a rel="prev" href=(prev) { "← Newer" }
                    }
                    span.page-count { "Page " (pagination.current) " of " (pagination.total) }
                    @if let Some(next) = pagination.next_url() {
                        a rel="next" href=(next) { "Older →" }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Page Renderers
    // ========================================================================

    fn render_article(&self, article: &Article, tags: &[&Tag]) -> Markup {
        let content = html! {
            article.post {
                h1 { (article.title) }
                time datetime=(article.created_at.to_rfc3339()) { (format_date(&article.created_at)) }
                div.post-body { (PreEscaped(&article.body)) }
                @if !tags.is_empty() {
                    ul.post-tags {
                        @for tag in tags {
                            li { a href=(paths::tag_page_url(&tag.slug, 1)) { (tag.name) } }
                        }
                    }
                }
            }
        };
        self.base_document(&article.title, Some(&article.description), content)
    }

    fn render_page(&self, page: &Page) -> Markup {
        let content = html! {
            article.page {
                h1 { (page.title) }
                div.page-body { (PreEscaped(&page.body)) }
            }
        };
        self.base_document(&page.title, None, content)
    }

    fn render_index(&self, articles: &[&Article], pagination: &Pagination) -> Markup {
        let content = html! {
            section.index-page {
                @if articles.is_empty() {
                    p.empty { "Nothing published yet." }
                } @else {
                    ul.post-list {
                        @for article in articles {
                            (self.article_summary(article))
                        }
                    }
                }
                (self.pagination_nav(pagination))
            }
        };
        let title = self.site.title.clone();
        self.base_document(&title, Some(&self.site.description), content)
    }

    fn render_tags_index(&self, tags: &[(&Tag, usize)]) -> Markup {
        let content = html! {
            section.tags-index {
                h1 { "Tags" }
                ul.tag-list {
                    @for (tag, count) in tags {
                        li {
                            a href=(paths::tag_page_url(&tag.slug, 1)) { (tag.name) }
                            " (" (count) ")"
                        }
                    }
                }
            }
        };
        self.base_document("Tags", None, content)
    }

    fn render_tag(&self, tag: &Tag, articles: &[&Article], pagination: &Pagination) -> Markup {
        let content = html! {
            section.tag-page {
                h1 { "Tagged “" (tag.name) "”" }
                ul.post-list {
                    @for article in articles {
                        (self.article_summary(article))
                    }
                }
                (self.pagination_nav(pagination))
            }
        };
        self.base_document(&tag.name, None, content)
    }

    fn render_search(&self) -> Markup {
        let content = html! {
            section.search-page {
                h1 { "Search" }
                input #search-input type="search" placeholder="Search articles" autocomplete="off";
                ul #search-results {}
                script { (PreEscaped(SEARCH_JS)) }
            }
        };
        self.base_document("Search", None, content)
    }

    // ========================================================================
    // XML
    // ========================================================================

    fn render_feed(&self, articles: &[&Article]) -> Markup {
        // Derived from content, not the clock, so unchanged content renders identically.
        let last_build = articles.iter().map(|a| a.updated_at).max();
        html! {
            (PreEscaped("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"))
            rss version="2.0" {
                channel {
                    title { (self.site.title) }
                    link { (self.site.base_url()) "/" }
                    description { (self.site.description) }
                    language { (self.site.language) }
                    @if let Some(at) = last_build {
                        lastBuildDate { (at.to_rfc2822()) }
                    }
                    @for article in articles {
                        @let url = self.absolute(&self.article_url(article));
                        item {
                            title { (article.title) }
                            link { (url) }
                            guid isPermaLink="true" { (url) }
                            pubDate { (article.created_at.to_rfc2822()) }
                            description { (PreEscaped(cdata(&article.body))) }
                        }
                    }
                }
            }
        }
    }
}

fn render_redirect(target: &str, permanent: bool) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="UTF-8";
                title { "Redirecting…" }
                meta http-equiv="refresh" content={ "0; url=" (target) };
                link rel="canonical" href=(target);
                @if !permanent {
                    meta name="robots" content="noindex";
                }
            }
            body {
                p { "Redirecting to " a href=(target) { (target) } }
            }
        }
    }
}

fn render_sitemap(entries: &[SitemapEntry]) -> Markup {
    html! {
        (PreEscaped("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"))
        urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" {
            @for entry in entries {
                url {
                    loc { (entry.loc) }
                    @if let Some(at) = entry.lastmod {
                        lastmod { (at.format("%Y-%m-%d")) }
                    }
                }
            }
        }
    }
}

/// Wrap markup in a CDATA section, splitting any embedded terminator.
fn cdata(body: &str) -> String {
    format!("<![CDATA[{}]]>", body.replace("]]>", "]]]]><![CDATA[>"))
}
