use clap::{Parser, Subcommand};
use staticpress::content::{ContentStore, SnapshotStore};
use staticpress::generate::{GenerationRunner, Generator, RunOptions};
use staticpress::schedule::{GenerationLock, GenerationScheduler};
use staticpress::types::Target;
use staticpress::{config, output};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn version_string() -> &'static str {
    let hash = env!("STATICPRESS_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{}@{hash}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "staticpress")]
#[command(about = "Static site generation and git deployment for a blog")]
#[command(long_about = "\
Static site generation and git deployment for a blog

Reads a content snapshot (content.json plus blob files), renders every page
into the output directory and optionally publishes the result to a git host.

Targets:

  all          everything (default)
  article:ID   one article plus the listings, feed, sitemap and tags it touches
  page:ID      one page plus the sitemap
  tag:ID       one tag's pages plus the tags index
  index        index pages
  feed         feed.xml
  sitemap      sitemap.xml

Relative paths in the config resolve against the config file's directory.

Run 'staticpress gen-config' to print a documented staticpress.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "staticpress.toml", global = true)]
    config: PathBuf,

    /// Content snapshot directory (holds content.json)
    #[arg(long, default_value = "content", global = true)]
    content: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Flags for commands that run generation.
#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Never run the asset build, even when compiled assets are missing
    #[arg(long)]
    no_precompile: bool,
    /// Skip publishing even when a remote provider is configured
    #[arg(long)]
    no_deploy: bool,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            precompile: !self.no_precompile,
            deploy: !self.no_deploy,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Regenerate a target now
    Generate {
        /// What to regenerate
        #[arg(default_value = "all")]
        target: Target,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Publish the existing output tree without regenerating
    Deploy,
    /// Read targets from stdin (one per line), debounce them, run when idle
    Schedule {
        /// Override schedule.debounce_secs
        #[arg(long)]
        debounce_secs: Option<u64>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Validate the config and content snapshot without generating
    Check,
    /// Print a stock staticpress.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    staticpress::init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.config)?;
    let work_dir = config_dir(&cli.config);
    let store = Arc::new(SnapshotStore::load(&cli.content)?);

    match cli.command {
        Command::Generate { target, run } => {
            let lock_path = work_dir.join(&site_config.schedule.lock_file);
            let generator = Generator::new(site_config, &work_dir, store.clone(), store)
                .with_options(run.options());
            let lock = GenerationLock::new(lock_path);
            let guard = lock.acquire()?;
            let report = generator.run(&target)?;
            drop(guard);
            output::print_run_report(&report);
        }
        Command::Deploy => {
            let generator = Generator::new(site_config, &work_dir, store.clone(), store);
            let outcome = generator.deploy_only()?;
            output::print_deploy_outcome(&outcome);
            if !outcome.success {
                return Err(outcome.message.into());
            }
        }
        Command::Schedule { debounce_secs, run } => {
            let mut schedule_config = site_config.schedule.clone();
            if let Some(secs) = debounce_secs {
                schedule_config.debounce_secs = secs;
            }
            let lock_path = work_dir.join(&schedule_config.lock_file);
            let generator = Generator::new(site_config, &work_dir, store.clone(), store)
                .with_options(run.options());
            let scheduler = GenerationScheduler::new(Arc::new(generator), &schedule_config, lock_path);

            let mut queued = 0;
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match line.parse::<Target>() {
                    Ok(target) => {
                        let request = scheduler.schedule(target, None);
                        println!("{}", output::format_queued(&request));
                        queued += 1;
                    }
                    Err(e) => eprintln!("Skipping '{line}': {e}"),
                }
            }
            let reports = scheduler.drain();
            output::print_schedule_summary(queued, &reports);
        }
        Command::Check => {
            let counts = output::ContentCounts {
                articles: store.articles()?.len(),
                published_articles: store.published_articles()?.len(),
                pages: store.pages()?.len(),
                tags: store.tags()?.len(),
                redirects: store.redirects()?.len(),
                blobs: store.snapshot().blobs.len(),
            };
            output::print_check(&counts);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Directory relative config paths resolve against.
fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
