//! BFS traversal guarantees against a scripted browser.

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::{FakeBrowser, FakeBrowserHandle, FakePageSpec};
use pagevault::browser::Browser;
use pagevault::config::{CaptureOptions, DiscoveryOptions, MultiPageOptions};
use pagevault::crawler::Crawler;
use pagevault::error::CaptureError;

fn options(depth: u8, max_pages: usize, same_domain_only: bool) -> CaptureOptions {
    CaptureOptions::default().with_multi_page(MultiPageOptions {
        enabled: true,
        depth,
        max_pages,
        same_domain_only,
    })
}

fn browser_handle(fake: Arc<FakeBrowser>) -> Arc<dyn Browser> {
    Arc::new(FakeBrowserHandle(fake))
}

#[tokio::test]
async fn same_domain_crawl_skips_foreign_hosts() {
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://example.test/article",
                FakePageSpec::new("Article", "<html>seed</html>")
                    .with_links(&["https://example.test/p2", "https://other.test/x"]),
            )
            .with_page(
                "https://example.test/p2",
                FakePageSpec::new("P2", "<html>p2</html>"),
            )
            .with_page("https://other.test/x", FakePageSpec::new("X", "<html>x</html>")),
    );
    let crawler = Crawler::new(browser_handle(fake.clone()));

    let pages = crawler
        .crawl_capture(
            "https://example.test/article",
            &options(1, 2, true),
            "test-agent",
            3,
            |_, _, _| {},
        )
        .await
        .expect("crawl succeeds");

    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://example.test/article", "https://example.test/p2"]);
    assert!(!fake.visited().iter().any(|u| u.contains("other.test")));
}

#[tokio::test]
async fn crawl_respects_page_budget_and_depth() {
    // A chain a -> b -> c -> d with depth 3 available but budget 2.
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://example.test/a",
                FakePageSpec::new("A", "<html>a</html>").with_links(&["https://example.test/b"]),
            )
            .with_page(
                "https://example.test/b",
                FakePageSpec::new("B", "<html>b</html>").with_links(&["https://example.test/c"]),
            )
            .with_page(
                "https://example.test/c",
                FakePageSpec::new("C", "<html>c</html>").with_links(&["https://example.test/d"]),
            )
            .with_page("https://example.test/d", FakePageSpec::new("D", "<html>d</html>")),
    );
    let crawler = Crawler::new(browser_handle(fake.clone()));

    let pages = crawler
        .crawl_capture(
            "https://example.test/a",
            &options(3, 2, true),
            "test-agent",
            3,
            |_, _, _| {},
        )
        .await
        .expect("crawl succeeds");
    assert_eq!(pages.len(), 2, "page budget exceeded");

    // Depth bound: depth limit of 1 stops after b even with budget left.
    let crawler = Crawler::new(browser_handle(fake.clone()));
    let pages = crawler
        .crawl_capture(
            "https://example.test/a",
            &options(1, 100, true),
            "test-agent",
            3,
            |_, _, _| {},
        )
        .await
        .expect("crawl succeeds");
    let max_depth = pages.iter().map(|p| p.depth).max().unwrap_or(0);
    assert_eq!(pages.len(), 2);
    assert!(max_depth <= 1);
}

#[tokio::test]
async fn no_url_is_captured_twice() {
    // a and b link to each other and to themselves.
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://example.test/a",
                FakePageSpec::new("A", "<html>a</html>")
                    .with_links(&["https://example.test/b", "https://example.test/a"]),
            )
            .with_page(
                "https://example.test/b",
                FakePageSpec::new("B", "<html>b</html>")
                    .with_links(&["https://example.test/a", "https://example.test/b#frag"]),
            ),
    );
    let crawler = Crawler::new(browser_handle(fake));

    let pages = crawler
        .crawl_capture(
            "https://example.test/a",
            &options(3, 10, true),
            "test-agent",
            3,
            |_, _, _| {},
        )
        .await
        .expect("crawl succeeds");

    let mut urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    let before = urls.len();
    urls.dedup();
    assert_eq!(before, urls.len());
    assert_eq!(before, 2);
}

#[tokio::test]
async fn failed_page_is_recorded_without_aborting_the_crawl() {
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://example.test/a",
                FakePageSpec::new("A", "<html>a</html>")
                    .with_links(&["https://example.test/broken", "https://example.test/b"]),
            )
            .with_page("https://example.test/b", FakePageSpec::new("B", "<html>b</html>"))
            .with_failing_url("https://example.test/broken"),
    );
    let crawler = Crawler::new(browser_handle(fake));

    let pages = crawler
        .crawl_capture(
            "https://example.test/a",
            &options(1, 10, true),
            "test-agent",
            3,
            |_, _, _| {},
        )
        .await
        .expect("crawl continues past the broken page");

    assert_eq!(pages.len(), 3);
    let broken = pages
        .iter()
        .find(|p| p.url.ends_with("/broken"))
        .expect("broken page recorded");
    assert!(!broken.success);
    assert!(broken.error.is_some());
    assert!(pages.iter().filter(|p| p.success).count() >= 2);
}

#[tokio::test]
async fn discovery_estimates_size_with_kind_weights() {
    let html = "<html>seed page</html>";
    let fake = Arc::new(FakeBrowser::new().with_page(
        "https://example.test/",
        FakePageSpec::new("Seed", html).with_discovery_counts(2, 1, 1, 1),
    ));
    let crawler = Crawler::new(browser_handle(fake));

    let cancel = AtomicBool::new(false);
    let pages = crawler
        .discover(
            "https://example.test/",
            &DiscoveryOptions::default(),
            &cancel,
            |_, _| {},
        )
        .await
        .expect("discovery succeeds");

    assert_eq!(pages.len(), 1);
    let expected = html.len() as u64 + 2 * 50_000 + 20_000 + 30_000 + 15_000;
    assert_eq!(pages[0].estimated_size, expected);
    assert_eq!(pages[0].resources.images, 2);
}

#[tokio::test]
async fn cancelled_discovery_stops_at_the_loop_head() {
    let fake = Arc::new(FakeBrowser::new().with_page(
        "https://example.test/",
        FakePageSpec::new("Seed", "<html></html>"),
    ));
    let crawler = Crawler::new(browser_handle(fake));

    let cancel = AtomicBool::new(true);
    let result = crawler
        .discover(
            "https://example.test/",
            &DiscoveryOptions::default(),
            &cancel,
            |_, _| {},
        )
        .await;
    assert!(matches!(result, Err(CaptureError::Cancelled)));
}
