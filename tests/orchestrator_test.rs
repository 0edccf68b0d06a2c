//! End-to-end capture workflows: archive layout, rewriting, batches and
//! the curated flow, with a scripted browser and a live resource server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBrowser, FakeBrowserHandle, FakePageSpec};
use pagevault::browser::Browser;
use pagevault::config::{CaptureOptions, DiscoveryOptions, ServiceConfig};
use pagevault::jobs::{BatchStatus, JobStatus};
use pagevault::orchestrator::Orchestrator;
use pagevault::test_crawl::TestCrawlStatus;
use serde_json::json;

fn service_config(root: &std::path::Path) -> ServiceConfig {
    ServiceConfig::default()
        .with_storage_dir(root.join("store"))
        .with_temp_dir(root.join("tmp"))
        .with_min_delay(Duration::from_millis(10))
}

async fn orchestrator(fake: Arc<FakeBrowser>, root: &std::path::Path) -> Orchestrator {
    let browser: Arc<dyn Browser> = Arc::new(FakeBrowserHandle(fake));
    Orchestrator::new(browser, service_config(root))
        .await
        .expect("orchestrator builds")
}

async fn wait_for_job(orchestrator: &Orchestrator, job_id: &str) -> pagevault::jobs::CaptureJob {
    for _ in 0..400 {
        if let Some(job) = orchestrator.jobs().get_job(job_id).await
            && job.status.is_terminal()
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

async fn wait_for_batch(orchestrator: &Orchestrator, batch_id: &str) -> pagevault::jobs::BatchJob {
    for _ in 0..400 {
        if let Some(batch) = orchestrator.batches().get_batch(batch_id).await
            && batch.is_terminal()
        {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("batch {batch_id} did not reach a terminal state");
}

#[tokio::test]
async fn single_page_capture_produces_a_self_contained_archive() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("png-a")
        .create_async()
        .await;
    server
        .mock("GET", "/b.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body("jpg-b")
        .create_async()
        .await;
    server
        .mock("GET", "/b@2x.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body("jpg-b2x")
        .create_async()
        .await;
    server
        .mock("GET", "/s.css")
        .with_status(200)
        .with_header("content-type", "text/css")
        .with_body(r#"@font-face { font-family: F; src: url("/f.woff2") format("woff2"); }"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/f.woff2")
        .with_status(200)
        .with_header("content-type", "font/woff2")
        .with_body("woff2-bytes")
        .create_async()
        .await;

    let page_url = format!("{base}/article");
    let html = format!(
        r#"<html><head><link rel="stylesheet" href="/s.css"></head><body><img src="/a.png"><img src="{base}/b.jpg" srcset="{base}/b.jpg 1x, {base}/b@2x.jpg 2x"></body></html>"#
    );
    let fake = Arc::new(FakeBrowser::new().with_page(
        &page_url,
        FakePageSpec::new("Article", &html).with_resources(json!({
            "images": [
                format!("{base}/a.png"),
                format!("{base}/b.jpg"),
                format!("{base}/b@2x.jpg")
            ],
            "imageCount": 2,
            "stylesheets": [
                { "url": format!("{base}/s.css"), "inline": false, "content": null, "index": 0 }
            ],
            "scripts": [],
            "favicon": null
        })),
    ));

    let root = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(fake, root.path()).await;

    let job_id = orchestrator
        .start_capture(&page_url, CaptureOptions::default())
        .await
        .expect("capture starts");
    let job = wait_for_job(&orchestrator, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    let step_names: Vec<&str> = job.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(step_names, vec!["navigate", "download", "rewrite", "persist"]);

    // Job stats track downloaded files.
    assert_eq!(job.stats.succeeded.images, 3);
    assert_eq!(job.stats.succeeded.stylesheets, 1);
    assert_eq!(job.stats.succeeded.fonts, 1);
    assert_eq!(job.stats.resources_downloaded, 5);
    assert!(job.stats.failed.images.is_empty());

    // Capture metadata counts page elements.
    let capture_id = job.capture_id.expect("capture id recorded");
    let (metadata, dir) = orchestrator
        .store()
        .get_capture(&capture_id)
        .await
        .expect("capture exists");
    assert_eq!(metadata.stats.images, 2);
    assert_eq!(metadata.stats.stylesheets, 1);
    assert_eq!(metadata.stats.scripts, 0);
    assert_eq!(metadata.stats.fonts, 1);
    assert_eq!(metadata.stats.total_pages, 1);
    assert_eq!(metadata.title, "Article");

    // Rewritten HTML points at the local buckets.
    let index_html = String::from_utf8(
        orchestrator
            .store()
            .get_capture_html(&capture_id)
            .await
            .expect("index.html readable"),
    )
    .expect("index.html is UTF-8");
    assert!(index_html.contains(r#"src="images/a.png""#), "got: {index_html}");
    assert!(index_html.contains(r#"src="images/b.jpg""#));
    assert!(index_html.contains(r#"srcset="images/b.jpg 1x, images/b_2x.jpg 2x""#));
    assert!(index_html.contains(r#"href="css/s.css""#));

    // The stylesheet reaches its font through the sibling bucket.
    let css = tokio::fs::read_to_string(dir.join("css/s.css"))
        .await
        .expect("stylesheet saved");
    assert!(css.contains(r#"url("../fonts/f.woff2")"#), "got: {css}");

    // Archive self-containment: every mapped file exists on disk.
    for relative in ["images/a.png", "images/b.jpg", "images/b_2x.jpg", "css/s.css", "fonts/f.woff2"] {
        assert!(dir.join(relative).exists(), "missing {relative}");
    }
}

#[tokio::test]
async fn missing_resources_do_not_fail_the_job() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    server
        .mock("GET", "/present.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("png")
        .create_async()
        .await;
    server
        .mock("GET", "/gone.png")
        .with_status(404)
        .expect_at_least(1)
        .create_async()
        .await;

    let page_url = format!("{base}/page");
    let html = format!(r#"<img src="{base}/present.png"><img src="{base}/gone.png">"#);
    let fake = Arc::new(FakeBrowser::new().with_page(
        &page_url,
        FakePageSpec::new("Page", &html).with_resources(json!({
            "images": [format!("{base}/present.png"), format!("{base}/gone.png")],
            "imageCount": 2,
            "stylesheets": [],
            "scripts": [],
            "favicon": null
        })),
    ));

    let root = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(fake, root.path()).await;
    let job_id = orchestrator
        .start_capture(&page_url, CaptureOptions::default())
        .await
        .expect("capture starts");
    let job = wait_for_job(&orchestrator, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.stats.succeeded.images, 1);
    assert_eq!(job.stats.failed.images.len(), 1);
    assert!(job.stats.failed.images[0].url.ends_with("/gone.png"));

    // The missing asset keeps its remote URL in the archive.
    let capture_id = job.capture_id.expect("capture id recorded");
    let index_html = String::from_utf8(
        orchestrator
            .store()
            .get_capture_html(&capture_id)
            .await
            .expect("index.html readable"),
    )
    .expect("index.html is UTF-8");
    assert!(index_html.contains(r#"src="images/present.png""#));
    assert!(index_html.contains(&format!(r#"src="{base}/gone.png""#)));
}

#[tokio::test]
async fn failed_navigation_fails_only_its_batch_member() {
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page("https://a.test/", FakePageSpec::new("A", "<html>a</html>"))
            .with_failing_url("https://b.test/"),
    );

    let root = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(fake, root.path()).await;
    let batch_id = orchestrator
        .capture_multi(
            &["https://a.test/".to_string(), "https://b.test/".to_string()],
            CaptureOptions::default(),
        )
        .await
        .expect("batch starts");

    let batch = wait_for_batch(&orchestrator, &batch_id).await;
    assert_eq!(batch.status(), BatchStatus::Partial);
    let summary = batch.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);

    let failed_member = batch
        .jobs
        .iter()
        .find(|m| m.url == "https://b.test/")
        .expect("failed member present");
    let failed_job = orchestrator
        .jobs()
        .get_job(&failed_member.job_id)
        .await
        .expect("job exists");
    assert!(failed_job.error.is_some());
}

#[tokio::test]
async fn batch_archive_groups_members_and_carries_a_manifest() {
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page("https://a.test/", FakePageSpec::new("A", "<html>a</html>"))
            .with_page("https://b.test/", FakePageSpec::new("B", "<html>b</html>")),
    );

    let root = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(fake, root.path()).await;
    let batch_id = orchestrator
        .capture_multi(
            &["https://a.test/".to_string(), "https://b.test/".to_string()],
            CaptureOptions::default(),
        )
        .await
        .expect("batch starts");
    let batch = wait_for_batch(&orchestrator, &batch_id).await;
    assert_eq!(batch.status(), BatchStatus::Completed);

    let zip_path = pagevault::export::export_batch_archive(
        orchestrator.store(),
        orchestrator.jobs(),
        &batch,
        &root.path().join("exports"),
    )
    .await
    .expect("export succeeds");

    let file = std::fs::File::open(&zip_path).expect("archive opens");
    let mut archive = zip::ZipArchive::new(file).expect("archive parses");
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect();

    assert!(names.contains(&"manifest.json".to_string()));
    // Each member's capture sits under <hostname>-<jobPrefix>/.
    assert!(
        names
            .iter()
            .any(|n| n.starts_with("a.test-") && n.ends_with("/index.html")),
        "got entries: {names:?}"
    );
    assert!(
        names
            .iter()
            .any(|n| n.starts_with("b.test-") && n.ends_with("/metadata.json")),
        "got entries: {names:?}"
    );

    let mut manifest = String::new();
    {
        use std::io::Read;
        archive
            .by_name("manifest.json")
            .expect("manifest entry")
            .read_to_string(&mut manifest)
            .expect("manifest readable");
    }
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest parses");
    assert_eq!(manifest["batchId"], batch.batch_id);
    assert_eq!(manifest["summary"]["completed"], 2);
}

#[tokio::test]
async fn curated_capture_applies_the_selection_algebra() {
    let site = "https://site.test";
    let mut fake = FakeBrowser::new().with_page(
        &format!("{site}/"),
        FakePageSpec::new("Home", "<html>home</html>").with_links(&[
            &format!("{site}/p1"),
            &format!("{site}/p2"),
            &format!("{site}/p3"),
            &format!("{site}/p4"),
        ]),
    );
    for page in ["p1", "p2", "p3", "p4", "px"] {
        fake = fake.with_page(
            &format!("{site}/{page}"),
            FakePageSpec::new(page, &format!("<html>{page}</html>")),
        );
    }
    let fake = Arc::new(fake);

    let root = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(fake.clone(), root.path()).await;

    // Discover first; curation requires a completed crawl.
    let crawl_id = orchestrator.test_crawls().start(
        &format!("{site}/"),
        DiscoveryOptions {
            depth: 1,
            max_pages: 10,
            ..DiscoveryOptions::default()
        },
    );
    for _ in 0..100 {
        if orchestrator
            .test_crawls()
            .get_status(&crawl_id)
            .is_some_and(|c| c.status == TestCrawlStatus::Completed)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // selected {p1, p3} ∪ additional {px} ∖ excluded {p1} = {p3, px}
    let batch_id = orchestrator
        .capture_curated(
            &crawl_id,
            &[format!("{site}/p1"), format!("{site}/p3")],
            &[format!("{site}/px")],
            &[format!("{site}/p1")],
            CaptureOptions::default(),
        )
        .await
        .expect("curated capture starts");

    let batch = wait_for_batch(&orchestrator, &batch_id).await;
    assert_eq!(batch.status(), BatchStatus::Completed);
    assert_eq!(batch.progress(), 100);

    let urls: Vec<String> = batch.jobs.iter().map(|m| m.url.clone()).collect();
    assert_eq!(urls, vec![format!("{site}/p3"), format!("{site}/px")]);

    // A crawl that is not completed is refused.
    let error = orchestrator
        .capture_curated(
            "no-such-crawl",
            &[format!("{site}/p3")],
            &[],
            &[],
            CaptureOptions::default(),
        )
        .await
        .expect_err("unknown crawl is refused");
    assert!(error.to_string().contains("not found"));
}
