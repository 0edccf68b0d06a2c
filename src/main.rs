//! pagevault CLI: capture pages, inspect the store, run test crawls.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pagevault::config::{CaptureOptions, DiscoveryOptions, MultiPageOptions, ServiceConfig};
use pagevault::jobs::JobStatus;
use pagevault::store::{ListQuery, SortKey, SortOrder};
use pagevault::{ChromiumBrowser, Orchestrator};

#[derive(Parser)]
#[command(name = "pagevault", about = "Archive web pages as self-contained snapshots")]
struct Cli {
    /// Base directory for the capture store.
    #[arg(long, default_value = "./data", global = true)]
    storage_dir: PathBuf,

    /// Run the browser with a visible window.
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture one URL (optionally as a multi-page crawl).
    Capture {
        url: String,
        /// Crawl linked pages breadth-first.
        #[arg(long)]
        multi_page: bool,
        /// Crawl depth (1-3).
        #[arg(long, default_value_t = 1)]
        depth: u8,
        /// Page budget (1-100).
        #[arg(long, default_value_t = 10)]
        max_pages: usize,
        /// Follow links to other hosts.
        #[arg(long)]
        allow_external: bool,
        /// Navigation timeout in milliseconds.
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
    /// List captures in the store.
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Sort key: date, title or size.
        #[arg(long, default_value = "date")]
        sort: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one capture's metadata.
    Show { id: String },
    /// Delete a capture.
    Delete { id: String },
    /// Run a discovery-only crawl and print what it finds.
    TestCrawl {
        url: String,
        #[arg(long, default_value_t = 2)]
        depth: u8,
        #[arg(long, default_value_t = 100)]
        max_pages: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = ServiceConfig::default().with_storage_dir(&cli.storage_dir);
    let needs_browser = matches!(cli.command, Command::Capture { .. } | Command::TestCrawl { .. });

    // The store-only commands should not pay for a browser launch.
    let browser: Arc<dyn pagevault::Browser> = if needs_browser {
        Arc::new(ChromiumBrowser::launch(!cli.headed).await?)
    } else {
        Arc::new(NoBrowser)
    };
    let orchestrator = Orchestrator::new(browser, config).await?;

    let result = run_command(&orchestrator, cli.command).await;
    if needs_browser {
        let _ = orchestrator.shutdown().await;
    }
    result
}

async fn run_command(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Capture {
            url,
            multi_page,
            depth,
            max_pages,
            allow_external,
            timeout_ms,
        } => {
            let options = CaptureOptions::default()
                .with_timeout_ms(timeout_ms)
                .with_multi_page(MultiPageOptions {
                    enabled: multi_page,
                    depth,
                    max_pages,
                    same_domain_only: !allow_external,
                });
            let job_id = orchestrator.start_capture(&url, options).await?;
            println!("job {job_id}");

            // The CLI is the one caller that wants to block on completion.
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let Some(job) = orchestrator.jobs().get_job(&job_id).await else {
                    anyhow::bail!("job {job_id} disappeared");
                };
                match job.status {
                    JobStatus::Completed => {
                        let path = job
                            .output_path
                            .map(|p| p.display().to_string())
                            .unwrap_or_default();
                        println!("completed: {path}");
                        println!(
                            "pages: {}, resources: {}/{}",
                            job.stats.total_pages,
                            job.stats.resources_downloaded,
                            job.stats.total_resources
                        );
                        return Ok(());
                    }
                    JobStatus::Failed => {
                        anyhow::bail!(
                            "capture failed: {}",
                            job.error.unwrap_or_else(|| "unknown error".to_string())
                        );
                    }
                    _ => {
                        if let Some(step) = &job.current_step {
                            eprint!("\r[{:>3}%] {step}          ", job.progress);
                        }
                    }
                }
            }
        }
        Command::List {
            tag,
            collection,
            search,
            sort,
            limit,
            offset,
        } => {
            let query = ListQuery {
                tag,
                collection,
                search,
                sort: match sort.as_str() {
                    "title" => SortKey::Title,
                    "size" => SortKey::Size,
                    _ => SortKey::Date,
                },
                order: SortOrder::Desc,
                limit: Some(limit),
                offset,
            };
            let page = orchestrator.store().list_captures(&query).await?;
            println!("{} capture(s), showing {}", page.total, page.captures.len());
            for capture in page.captures {
                println!(
                    "{}  {}  {}  {} bytes",
                    capture.id,
                    capture.captured_at.format("%Y-%m-%d %H:%M"),
                    capture.title,
                    capture.size
                );
            }
            Ok(())
        }
        Command::Show { id } => {
            let (metadata, path) = orchestrator.store().get_capture(&id).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            println!("path: {}", path.display());
            Ok(())
        }
        Command::Delete { id } => {
            orchestrator.store().delete_capture(&id).await?;
            println!("deleted {id}");
            Ok(())
        }
        Command::TestCrawl {
            url,
            depth,
            max_pages,
        } => {
            let options = DiscoveryOptions {
                depth,
                max_pages,
                ..DiscoveryOptions::default()
            };
            let crawl_id = orchestrator.test_crawls().start(&url, options);
            println!("test crawl {crawl_id}");

            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let Some(crawl) = orchestrator.test_crawls().get_status(&crawl_id) else {
                    anyhow::bail!("test crawl {crawl_id} disappeared");
                };
                match crawl.status {
                    pagevault::TestCrawlStatus::Crawling => {
                        eprint!("\r[{:>3}%] {} pages", crawl.progress, crawl.discovered.pages.len());
                    }
                    pagevault::TestCrawlStatus::Completed => {
                        println!(
                            "\ndiscovered {} pages, ~{} bytes",
                            crawl.discovered.pages.len(),
                            crawl.discovered.total_estimated_size
                        );
                        for page in crawl.discovered.pages {
                            println!("  [{}] {}  {}", page.depth, page.url, page.title);
                        }
                        return Ok(());
                    }
                    pagevault::TestCrawlStatus::Failed => {
                        anyhow::bail!(
                            "test crawl failed: {}",
                            crawl.error.unwrap_or_else(|| "unknown error".to_string())
                        );
                    }
                }
            }
        }
    }
}

/// Placeholder browser for store-only commands; any page request is a bug.
struct NoBrowser;

#[async_trait::async_trait]
impl pagevault::Browser for NoBrowser {
    async fn new_page(&self) -> Result<Box<dyn pagevault::BrowserPage>> {
        anyhow::bail!("this command does not drive a browser")
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
