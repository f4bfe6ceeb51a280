//! # staticpress
//!
//! Turns a blog's content (articles, pages, tags, redirects, uploaded media)
//! into a self-contained static HTML tree and, optionally, publishes that
//! tree to a git hosting provider.
//!
//! # Architecture
//!
//! ```text
//! content edit ─▶ GenerationScheduler ─▶ GenerationLock ─▶ Generator
//!                  (debounce)             (one run at a time)   │
//!                                                               ▼
//!        AssetsManager · Renderer ─▶ FileWriter ─▶ ContentRewriter ─▶ BlobExporter
//!                                                               │
//!                                                     output tree ─▶ DeployService
//! ```
//!
//! A run is idempotent: rendering the same content twice produces the same
//! bytes, unchanged files are not rewritten, and media exports are keyed by a
//! content digest. Rerunning after a crash repairs whatever the crash left.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`generate`] | The orchestrator: collects, renders, writes, cleans, deploys one target |
//! | [`schedule`] | Debounced queue, worker pool and the global generation lock |
//! | [`render`] | Maud templates for every page type, feed and sitemap |
//! | [`writer`] | Persists rendered markup through the rewriter, skipping unchanged bytes |
//! | [`rewrite`] | Replaces dynamic storage URLs in markup with static upload paths |
//! | [`blobs`] | Exports referenced media (optimized variant or original) into `uploads/` |
//! | [`assets`] | Ensures the compiled CSS/JS bundle exists and mirrors it into the output |
//! | [`deploy`] | Publishes the output tree by committing to a git remote |
//! | [`redirects`] | Redirect rule projections: HTML pages, `_redirects`, `.htaccess`, JS |
//! | [`search`] | `search.json` index for the client-side search page |
//! | [`ledger`] | Records which run scope owns each output file, for cleanup |
//! | [`content`] | Content and blob store traits, plus the JSON snapshot store |
//! | [`imaging`] | Pure-Rust image variant generation |
//! | [`command`] | External command execution (asset build, git) behind a trait |
//! | [`config`] | `staticpress.toml` loading and validation |
//! | [`paths`] | Output-tree layout: every file name and URL the site uses |
//! | [`types`] | Content records and generation targets |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Maud Over Template Engines
//!
//! Pages are generated with [Maud](https://maud.lambda.xyz/). Templates are
//! checked at compile time and interpolation is escaped by default, so a
//! title containing `<script>` cannot break out of its element. Article
//! bodies are trusted HTML from the editor and are inserted pre-escaped.
//!
//! ## Collaborators Behind Traits
//!
//! Everything with side effects outside the output tree sits behind a trait:
//! [`content::ContentStore`], [`content::BlobStore`],
//! [`imaging::ImageBackend`], [`command::CommandRunner`] and
//! [`generate::GenerationRunner`]. Tests swap in recording mocks; the
//! binary wires the JSON snapshot store, the Rust image backend and real
//! processes.
//!
//! ## Fail-Open Media
//!
//! A broken or missing upload never fails a run. The variant falls back to
//! the original bytes, and a reference that cannot be resolved is left as
//! it was. Pages ship; the problem is logged.

pub mod assets;
pub mod blobs;
pub mod command;
pub mod config;
pub mod content;
pub mod deploy;
pub mod generate;
pub mod imaging;
pub mod ledger;
pub mod output;
pub mod paths;
pub mod redirects;
pub mod render;
pub mod rewrite;
pub mod schedule;
pub mod search;
pub mod types;
pub mod writer;

/// Initialize tracing with the specified verbosity level.
///
/// `verbose`: 0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE. `RUST_LOG`
/// directives are honored on top of the level.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
