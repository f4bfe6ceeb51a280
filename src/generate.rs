//! Generation runs.
//!
//! A [`Generator`] turns the current content into the output tree for one
//! [`Target`]. Each run walks a fixed sequence of phases:
//!
//! ```text
//! Collecting ─▶ Rendering ─▶ Writing ─▶ Cleaning ─▶ Deploying
//! ```
//!
//! - **Collecting** refreshes the content store and plans the artifacts the
//!   target owns (path, ledger scope, view).
//! - **Rendering** runs the [`Renderer`] for every planned view in parallel
//!   with rayon. Rendering has no side effects.
//! - **Writing** ensures compiled assets (full runs), exports referenced
//!   media, then persists every artifact through the [`FileWriter`] in plan
//!   order. When two artifacts share a path the later one (a redirect page)
//!   wins and the earlier one is never written.
//! - **Cleaning** deletes ledger paths in the target's scopes that this run
//!   did not write. A full run also sweeps untracked files from managed
//!   locations.
//! - **Deploying** hands the tree to the [`DeployService`] when a remote
//!   provider is configured.
//!
//! Errors in the first three phases abort the run and are returned. The
//! tree is left as far as it got; the next run repairs it. Cleaning and
//! deploy problems are logged and reported, never returned.
//!
//! ## Targets and scopes
//!
//! | Target        | Regenerates                                                     |
//! |---------------|-----------------------------------------------------------------|
//! | `all`         | everything, plus `uploads/`, `static/`, redirect helpers         |
//! | `article:ID`  | the article, index pages, feed, sitemap, search, its tag pages, redirect helpers |
//! | `page:ID`     | the page, sitemap, redirect helpers                              |
//! | `tag:ID`      | the tag's pages, tags index                                      |
//! | `index`       | index pages                                                      |
//! | `feed`        | `feed.xml`                                                       |
//! | `sitemap`     | `sitemap.xml`                                                    |
//!
//! A target whose item no longer exists (or is no longer published) still
//! owns its scope, so its previous files are cleaned.

use crate::assets::{self, AssetError, AssetsManager, AssetsOutcome};
use crate::blobs::BlobExporter;
use crate::command::{CommandRunner, SystemRunner};
use crate::config::{DeployProvider, SiteConfig, SiteSection};
use crate::content::{BlobStore, ContentError, ContentStore};
use crate::deploy::{self, DeployOutcome, DeployService, DeployTarget, Redactor};
use crate::imaging::{ImageBackend, RustBackend, VariantParams};
use crate::ledger::{OutputLedger, Scope};
use crate::paths;
use crate::redirects;
use crate::render::{HtmlRenderer, Listing, Pagination, RenderError, Renderer, SitemapEntry, View};
use crate::rewrite::{ContentRewriter, RewritePatterns};
use crate::schedule::GenerationLock;
use crate::search;
use crate::types::{Article, BlobId, ItemId, Page, Redirect, StaticFile, Tag, Target};
use crate::writer::{FileWriter, WriteError, WriteStatus, WrittenFile};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("write error: {0}")]
    Write(#[from] WriteError),
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("invalid rewrite pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Executes one generation run for a target.
pub trait GenerationRunner: Send + Sync {
    fn run(&self, target: &Target) -> Result<RunReport, GenerateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Collecting,
    Rendering,
    Writing,
    Cleaning,
    Deploying,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Collecting => "collecting",
            Self::Rendering => "rendering",
            Self::Writing => "writing",
            Self::Cleaning => "cleaning",
            Self::Deploying => "deploying",
        })
    }
}

/// Per-invocation switches (CLI flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Allow the asset build when compiled assets are missing.
    pub precompile: bool,
    /// Publish after a successful run when a remote provider is configured.
    pub deploy: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            precompile: true,
            deploy: true,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub target: Target,
    /// Files whose bytes changed.
    pub written: usize,
    /// Files regenerated with identical bytes.
    pub unchanged: usize,
    /// Stale files deleted during cleaning.
    pub removed: usize,
    pub blobs_exported: usize,
    /// Exported with original bytes after the variant failed.
    pub blobs_degraded: usize,
    pub assets: Option<AssetsOutcome>,
    pub deploy: Option<DeployOutcome>,
    pub duration_ms: u128,
}

/// The generation orchestrator.
pub struct Generator {
    config: SiteConfig,
    /// Relative paths in the config resolve against this directory.
    work_dir: PathBuf,
    content: Arc<dyn ContentStore>,
    blobs: Arc<dyn BlobStore>,
    backend: Arc<dyn ImageBackend>,
    renderer: Arc<dyn Renderer>,
    runner: Arc<dyn CommandRunner>,
    options: RunOptions,
}

impl Generator {
    /// Generator with the stock renderer, image backend and command runner.
    pub fn new(
        config: SiteConfig,
        work_dir: impl Into<PathBuf>,
        content: Arc<dyn ContentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let renderer = Arc::new(HtmlRenderer::new(config.site.clone()));
        Self {
            config,
            work_dir: work_dir.into(),
            content,
            blobs,
            backend: Arc::new(RustBackend::new()),
            renderer,
            runner: Arc::new(SystemRunner),
            options: RunOptions::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join(&self.config.output.dir)
    }

    /// Publish the current output tree without regenerating it.
    ///
    /// Holds the generation lock at `schedule.lock_file` for the whole deploy.
    pub fn deploy_only(&self) -> Result<DeployOutcome, GenerateError> {
        let lock = GenerationLock::new(self.work_dir.join(&self.config.schedule.lock_file));
        let _guard = lock.acquire()?;
        self.content.refresh()?;
        let articles = self.content.published_articles()?;
        Ok(self.deploy(&self.output_dir(), &articles))
    }

    fn generate(&self, target: &Target) -> Result<RunReport, GenerateError> {
        let started = Instant::now();
        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir)?;
        let site = &self.config.site;
        let prefix = site.article_route_prefix.as_deref();

        // --- Collecting ---
        log_phase(target, RunPhase::Collecting);
        self.content.refresh()?;
        let data = Collected::load(self.content.as_ref(), target)?;
        let sitemap = sitemap_entries(site.base_url(), prefix, &data.articles, &data.pages);
        let mut planner = Planner::new(site, &data, &sitemap);
        planner.plan(target)?;
        let Planner {
            artifacts,
            owned,
            blob_ids,
            ..
        } = planner;

        // --- Rendering ---
        log_phase(target, RunPhase::Rendering);
        let renderer = self.renderer.as_ref();
        let rendered: Vec<Rendered> = artifacts
            .par_iter()
            .map(|artifact| artifact.render(renderer))
            .collect::<Result<_, RenderError>>()?;

        // --- Writing ---
        log_phase(target, RunPhase::Writing);
        let full = matches!(target, Target::All);
        let assets = if full {
            let manager = AssetsManager::new(&self.config.assets, self.runner.as_ref(), &self.work_dir);
            Some(manager.ensure(&output_dir, self.options.precompile)?)
        } else {
            None
        };

        let patterns = RewritePatterns::new(&self.config.rewrite.storage_path)?;
        let exporter = BlobExporter::new(
            self.blobs.as_ref(),
            self.backend.as_ref(),
            &output_dir,
            VariantParams::from(&self.config.uploads),
        );
        exporter.export_ids(&blob_ids);
        let rewriter = ContentRewriter::new(&patterns, &exporter, site.base_url());
        let writer = FileWriter::new(&output_dir, &rewriter);

        let mut ledger = OutputLedger::load(&output_dir);
        let mut tally = Tally::default();
        for item in &rendered {
            let file = writer.write(&item.path, &item.content)?;
            tally.record(&mut ledger, item.scope, file);
        }
        if full {
            for file in self.copy_static_files(&writer, &data.static_files) {
                tally.record(&mut ledger, Scope::Static, file);
            }
        }
        let blobs_exported = exporter.exported_count();
        let mut blobs_degraded = 0;
        for export in exporter.exported_files() {
            blobs_degraded += usize::from(export.degraded);
            let file = WrittenFile {
                path: export.path,
                digest: export.digest,
                status: export.status,
            };
            tally.record(&mut ledger, Scope::Uploads, file);
        }

        // --- Cleaning ---
        log_phase(target, RunPhase::Cleaning);
        let mut owned = owned;
        if full {
            owned.extend(ledger.entries.values().map(|e| e.scope));
            owned.insert(Scope::Uploads);
            owned.insert(Scope::Static);
        }
        let mut removed = 0;
        for rel in ledger.stale_paths(&owned, &tally.paths) {
            if remove_output_file(&output_dir, &rel) {
                removed += 1;
            }
            ledger.remove(&rel);
        }
        if full {
            removed += sweep_untracked(&output_dir, &tally.paths, prefix);
        }
        if let Err(e) = ledger.save(&output_dir) {
            warn!(error = %e, "could not save output ledger");
        }

        // --- Deploying ---
        let deploy = if self.options.deploy && self.config.deploy.provider != DeployProvider::Local {
            log_phase(target, RunPhase::Deploying);
            Some(self.deploy(&output_dir, &data.articles))
        } else {
            None
        };

        let report = RunReport {
            target: *target,
            written: tally.written,
            unchanged: tally.unchanged,
            removed,
            blobs_exported,
            blobs_degraded,
            assets,
            deploy,
            duration_ms: started.elapsed().as_millis(),
        };
        info!(
            event = "run.complete",
            target = %target,
            written = report.written,
            unchanged = report.unchanged,
            removed = report.removed,
            blobs = report.blobs_exported,
            blobs_degraded = report.blobs_degraded,
            duration_ms = report.duration_ms as u64,
            "generation complete"
        );
        Ok(report)
    }

    /// Copy user static files into `static/`. Individual failures are skipped.
    fn copy_static_files(&self, writer: &FileWriter<'_>, records: &[StaticFile]) -> Vec<WrittenFile> {
        let mut written = Vec::new();
        for record in records {
            let rel = format!("{}/{}", paths::STATIC_DIR, record.filename);
            let bytes = match self.blobs.find(record.blob_id) {
                Ok(Some(asset)) => self.blobs.read(&asset),
                Ok(None) => Err(ContentError::MissingBlob(record.blob_id)),
                Err(e) => Err(e),
            };
            match bytes.map_err(GenerateError::from).and_then(|b| Ok(writer.write_bytes(&rel, &b)?)) {
                Ok(file) => written.push(file),
                Err(e) => error!(filename = %record.filename, error = %e, "static file copy failed"),
            }
        }

        let source = self.work_dir.join(&self.config.static_files.source_dir);
        let files = match assets::relative_files(&source) {
            Ok(files) => files,
            Err(e) => {
                error!(source = %source.display(), error = %e, "could not list static files");
                Vec::new()
            }
        };
        for rel in files {
            let dest = format!("{}/{rel}", paths::STATIC_DIR);
            let result = fs::read(source.join(&rel))
                .map_err(GenerateError::from)
                .and_then(|b| Ok(writer.write_bytes(&dest, &b)?));
            match result {
                Ok(file) => written.push(file),
                Err(e) => error!(path = %rel, error = %e, "static file copy failed"),
            }
        }
        if !written.is_empty() {
            info!(count = written.len(), "copied static files");
        }
        written
    }

    fn deploy(&self, output_dir: &Path, articles: &[Article]) -> DeployOutcome {
        let site = &self.config.site;
        let publish = deploy::default_publish_list(
            site.article_route_prefix.as_deref(),
            articles.iter().map(|a| a.slug.as_str()),
        );
        let target = DeployTarget::from_config(&self.config.deploy, publish);
        let redactor = match Redactor::new(target.credential.as_deref()) {
            Ok(r) => r,
            Err(e) => {
                error!(event = "deploy.failed", error = %e, "could not build credential redactor");
                return DeployOutcome {
                    success: false,
                    message: format!("deploy aborted: {e}"),
                    status: deploy::DeployStatus::Failed,
                };
            }
        };
        DeployService::new(&target, self.runner.as_ref(), &redactor).deploy(output_dir)
    }
}

impl GenerationRunner for Generator {
    fn run(&self, target: &Target) -> Result<RunReport, GenerateError> {
        self.generate(target).inspect_err(|e| {
            error!(target = %target, error = %e, "generation run failed");
        })
    }
}

fn log_phase(target: &Target, phase: RunPhase) {
    info!(event = "run.phase", target = %target, phase = %phase, "run phase");
}

// ============================================================================
// Collecting
// ============================================================================

/// Content snapshot for one run.
struct Collected {
    /// Publishable, newest first.
    articles: Vec<Article>,
    /// Publishable, non-redirect.
    pages: Vec<Page>,
    /// All tags, by name.
    tags: Vec<Tag>,
    redirects: Vec<Redirect>,
    static_files: Vec<StaticFile>,
    /// Tags of the targeted article regardless of its status, so an
    /// unpublished article still refreshes the tag pages it left.
    target_article_tags: Vec<ItemId>,
}

impl Collected {
    fn load(store: &dyn ContentStore, target: &Target) -> Result<Self, ContentError> {
        let mut tags = store.tags()?;
        tags.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
        let target_article_tags = match target {
            Target::Article(id) => store.article(*id)?.map(|a| a.tag_ids).unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(Self {
            articles: store.published_articles()?,
            pages: store.published_pages()?,
            tags,
            redirects: store.redirects()?,
            static_files: if matches!(target, Target::All) {
                store.static_files()?
            } else {
                Vec::new()
            },
            target_article_tags,
        })
    }

    fn tagged(&self, tag: &Tag) -> Vec<&Article> {
        self.articles
            .iter()
            .filter(|a| a.tag_ids.contains(&tag.id))
            .collect()
    }
}

fn sitemap_entries(
    base_url: &str,
    prefix: Option<&str>,
    articles: &[Article],
    pages: &[Page],
) -> Vec<SitemapEntry> {
    let mut entries = vec![SitemapEntry {
        loc: format!("{base_url}/"),
        lastmod: articles.iter().map(|a| a.updated_at).max(),
    }];
    entries.extend(articles.iter().map(|a| SitemapEntry {
        loc: format!("{base_url}{}", paths::article_url(&a.slug, prefix)),
        lastmod: Some(a.updated_at),
    }));
    entries.extend(pages.iter().map(|p| SitemapEntry {
        loc: format!("{base_url}{}", paths::page_url(&p.slug)),
        lastmod: Some(p.updated_at),
    }));
    entries
}

// ============================================================================
// Planning
// ============================================================================

enum Body<'a> {
    View(View<'a>),
    /// Produced without the renderer (JSON, redirect rule files).
    Text(String),
}

struct Artifact<'a> {
    path: String,
    scope: Scope,
    body: Body<'a>,
}

impl Artifact<'_> {
    fn render(&self, renderer: &dyn Renderer) -> Result<Rendered, RenderError> {
        let content = match &self.body {
            Body::View(view) => {
                debug!(template = view.template_name(), path = %self.path, "rendering");
                renderer.render(view)?
            }
            Body::Text(text) => text.clone(),
        };
        Ok(Rendered {
            path: self.path.clone(),
            scope: self.scope,
            content,
        })
    }
}

struct Rendered {
    path: String,
    scope: Scope,
    content: String,
}

/// Splits `items` into pages of `per_page`; always at least one (possibly empty) page.
fn paginate<T>(items: &[T], per_page: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return vec![&items[..0]];
    }
    items.chunks(per_page.max(1)).collect()
}

struct Planner<'a> {
    site: &'a SiteSection,
    data: &'a Collected,
    sitemap: &'a [SitemapEntry],
    artifacts: Vec<Artifact<'a>>,
    owned: BTreeSet<Scope>,
    blob_ids: Vec<BlobId>,
}

impl<'a> Planner<'a> {
    fn new(site: &'a SiteSection, data: &'a Collected, sitemap: &'a [SitemapEntry]) -> Self {
        Self {
            site,
            data,
            sitemap,
            artifacts: Vec::new(),
            owned: BTreeSet::new(),
            blob_ids: Vec::new(),
        }
    }

    fn plan(&mut self, target: &Target) -> Result<(), serde_json::Error> {
        let data = self.data;
        match *target {
            Target::All => {
                for article in &data.articles {
                    self.blob_ids.extend(&article.blob_ids);
                }
                for page in &data.pages {
                    self.blob_ids.extend(&page.blob_ids);
                }
                self.index();
                self.search()?;
                for article in &data.articles {
                    self.article(article);
                }
                for page in &data.pages {
                    self.page(page);
                }
                self.tags_index();
                for tag in &data.tags {
                    self.tag(tag);
                }
                self.feed();
                self.sitemap();
                // Last, so a redirect page replaces content at the same path.
                self.redirects()?;
            }
            Target::Article(id) => {
                self.owned.insert(Scope::Article(id));
                if let Some(article) = data.articles.iter().find(|a| a.id == id) {
                    self.blob_ids.extend(&article.blob_ids);
                    self.article(article);
                }
                self.index();
                self.feed();
                self.sitemap();
                self.search()?;
                for tag in data.tags.iter().filter(|t| data.target_article_tags.contains(&t.id)) {
                    self.tag(tag);
                }
                self.redirects()?;
            }
            Target::Page(id) => {
                self.owned.insert(Scope::Page(id));
                if let Some(page) = data.pages.iter().find(|p| p.id == id) {
                    self.blob_ids.extend(&page.blob_ids);
                    self.page(page);
                }
                self.sitemap();
                self.redirects()?;
            }
            Target::Tag(id) => {
                self.owned.insert(Scope::Tag(id));
                if let Some(tag) = data.tags.iter().find(|t| t.id == id) {
                    self.tag(tag);
                }
                self.tags_index();
            }
            Target::Index => self.index(),
            Target::Feed => self.feed(),
            Target::Sitemap => self.sitemap(),
        }
        self.drop_shadowed();
        Ok(())
    }

    /// Keep only the last artifact planned for each path.
    fn drop_shadowed(&mut self) {
        let mut seen = HashSet::new();
        let mut kept: Vec<Artifact<'a>> = self
            .artifacts
            .drain(..)
            .rev()
            .filter(|a| seen.insert(a.path.clone()))
            .collect();
        kept.reverse();
        self.artifacts = kept;
    }

    fn push(&mut self, path: String, scope: Scope, body: Body<'a>) {
        self.owned.insert(scope);
        self.artifacts.push(Artifact { path, scope, body });
    }

    fn index(&mut self) {
        self.owned.insert(Scope::Index);
        let data = self.data;
        let chunks = paginate(&data.articles, self.site.per_page);
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let n = i + 1;
            let view = || View::Index {
                articles: chunk.iter().collect(),
                pagination: Pagination {
                    listing: Listing::Index,
                    current: n,
                    total,
                },
            };
            if n == 1 {
                self.push(paths::INDEX_FILE.to_string(), Scope::Index, Body::View(view()));
            }
            self.push(paths::index_page_path(n), Scope::Index, Body::View(view()));
        }
    }

    fn article(&mut self, article: &'a Article) {
        let data = self.data;
        let tags = data
            .tags
            .iter()
            .filter(|t| article.tag_ids.contains(&t.id))
            .collect();
        self.push(
            paths::article_path(&article.slug, self.site.article_route_prefix.as_deref()),
            Scope::Article(article.id),
            Body::View(View::Article { article, tags }),
        );
    }

    fn page(&mut self, page: &'a Page) {
        self.push(
            paths::page_path(&page.slug),
            Scope::Page(page.id),
            Body::View(View::Page { page }),
        );
    }

    fn tags_index(&mut self) {
        let data = self.data;
        let tags = data.tags.iter().map(|t| (t, data.tagged(t).len())).collect();
        self.push(
            paths::TAGS_INDEX.to_string(),
            Scope::TagsIndex,
            Body::View(View::TagsIndex { tags }),
        );
    }

    fn tag(&mut self, tag: &'a Tag) {
        let data = self.data;
        let tagged = data.tagged(tag);
        let chunks = paginate(&tagged, self.site.per_page);
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let n = i + 1;
            let view = || View::Tag {
                tag,
                articles: chunk.to_vec(),
                pagination: Pagination {
                    listing: Listing::Tag(tag.slug.clone()),
                    current: n,
                    total,
                },
            };
            if n == 1 {
                self.push(paths::tag_path(&tag.slug), Scope::Tag(tag.id), Body::View(view()));
            }
            self.push(paths::tag_page_path(&tag.slug, n), Scope::Tag(tag.id), Body::View(view()));
        }
    }

    fn feed(&mut self) {
        let data = self.data;
        let articles = data.articles.iter().collect();
        self.push(
            paths::FEED_FILE.to_string(),
            Scope::Feed,
            Body::View(View::Feed { articles }),
        );
    }

    fn sitemap(&mut self) {
        let entries = self.sitemap;
        self.push(
            paths::SITEMAP_FILE.to_string(),
            Scope::Sitemap,
            Body::View(View::Sitemap { entries }),
        );
    }

    fn search(&mut self) -> Result<(), serde_json::Error> {
        let data = self.data;
        let articles: Vec<&Article> = data.articles.iter().collect();
        let entries = search::build_index(
            &articles,
            &data.tags,
            self.site.article_route_prefix.as_deref(),
        );
        self.push(paths::SEARCH_HTML.to_string(), Scope::Search, Body::View(View::Search));
        self.push(
            paths::SEARCH_JSON.to_string(),
            Scope::Search,
            Body::Text(search::to_json(&entries)?),
        );
        Ok(())
    }

    fn redirects(&mut self) -> Result<(), serde_json::Error> {
        let data = self.data;
        self.owned.insert(Scope::Redirects);
        self.push(
            paths::REDIRECTS_JS.to_string(),
            Scope::Redirects,
            Body::Text(redirects::redirects_js(&data.redirects)?),
        );
        let rules = redirects::compile_rules(&data.redirects);
        if rules.is_empty() {
            return Ok(());
        }
        if let Some(body) = redirects::netlify_file(&rules) {
            self.push(paths::NETLIFY_REDIRECTS.to_string(), Scope::Redirects, Body::Text(body));
        }
        if let Some(body) = redirects::htaccess_file(&rules) {
            self.push(paths::HTACCESS.to_string(), Scope::Redirects, Body::Text(body));
        }
        let articles: Vec<&Article> = data.articles.iter().collect();
        let pages: Vec<&Page> = data.pages.iter().collect();
        let site_paths = redirects::collect_site_paths(
            &articles,
            &pages,
            &data.tags,
            self.site.per_page,
            self.site.article_route_prefix.as_deref(),
        );
        for page in redirects::redirect_pages(&rules, &site_paths) {
            self.push(
                page.path,
                Scope::Redirects,
                Body::View(View::Redirect {
                    target: page.target,
                    permanent: page.permanent,
                }),
            );
        }
        Ok(())
    }
}

// ============================================================================
// Writing and cleaning helpers
// ============================================================================

#[derive(Default)]
struct Tally {
    written: usize,
    unchanged: usize,
    paths: BTreeSet<String>,
}

impl Tally {
    fn record(&mut self, ledger: &mut OutputLedger, scope: Scope, file: WrittenFile) {
        match file.status {
            WriteStatus::Written => self.written += 1,
            WriteStatus::Unchanged => self.unchanged += 1,
        }
        ledger.record(file.path.clone(), scope, file.digest);
        self.paths.insert(file.path);
    }
}

/// Delete one output file and any directories it leaves empty. Failures are logged.
fn remove_output_file(output_dir: &Path, rel: &str) -> bool {
    if !paths::is_safe_relative(rel) {
        warn!(path = rel, "refusing to remove path outside output tree");
        return false;
    }
    let full = output_dir.join(rel);
    match fs::remove_file(&full) {
        Ok(()) => {
            info!(event = "file.removed", path = rel, "removed stale file");
            let mut dir = full.parent();
            while let Some(d) = dir {
                if d == output_dir || fs::remove_dir(d).is_err() {
                    break;
                }
                dir = d.parent();
            }
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = rel, error = %e, "could not remove stale file");
            false
        }
    }
}

/// Remove files in generator-managed locations that no run recorded.
fn sweep_untracked(output_dir: &Path, written: &BTreeSet<String>, prefix: Option<&str>) -> usize {
    let mut candidates = Vec::new();
    if let Ok(entries) = fs::read_dir(output_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().is_ok_and(|t| t.is_file());
            if is_file && name.ends_with(".html") && !paths::ERROR_PAGES.contains(&name.as_str()) {
                candidates.push(name);
            }
        }
    }
    let mut dirs = vec!["page", "pages", "tags", paths::UPLOADS_DIR, paths::STATIC_DIR];
    let prefix = prefix.map(|p| p.trim_matches('/'));
    if let Some(p) = prefix {
        dirs.push(p);
    }
    for dir in dirs {
        match assets::relative_files(&output_dir.join(dir)) {
            Ok(files) => candidates.extend(files.into_iter().map(|f| format!("{dir}/{f}"))),
            Err(e) => warn!(dir, error = %e, "could not scan for untracked files"),
        }
    }
    candidates
        .into_iter()
        .filter(|c| !written.contains(c))
        .filter(|c| remove_output_file(output_dir, c))
        .count()
}
