//! End-to-end generation scenarios against the public API.

mod common;

use common::*;
use staticpress::content::Snapshot;
use staticpress::generate::GenerationRunner;
use staticpress::types::{PublishStatus, Redirect, Target};

fn hello_site() -> Site {
    let mut hello = article(1, "hello", "");
    hello.body = format!(
        r#"<h1>Hello</h1><p>First post.</p><img src="{}">"#,
        storage_url("tok-photo", "photo.png")
    );
    hello.blob_ids = vec![7];
    let site = Site::new(Snapshot {
        articles: vec![hello],
        ..Snapshot::default()
    });
    site.store.insert_blob(image_asset(7, "tok-photo", "photo.png"), png_bytes());
    site
}

#[test]
fn article_with_image_is_rewritten_and_indexed() {
    let site = hello_site();
    let report = site.generator().run(&Target::All).unwrap();

    let html = site.read("hello.html");
    assert!(html.contains("/uploads/7-photo.png"), "{html}");
    assert!(!html.contains("/rails/active_storage/"));
    assert!(html.contains(r#"loading="lazy""#));
    assert_eq!(site.uploads(), vec!["7-photo.png"]);
    assert_eq!(report.blobs_exported, 1);

    let search: serde_json::Value = serde_json::from_str(&site.read("search.json")).unwrap();
    assert_eq!(search[0]["url"], "/hello.html");
    assert_eq!(search[0]["title"], "hello");

    let feed = site.read("feed.xml");
    assert!(feed.contains(&format!("{BASE_URL}/uploads/7-photo.png")));
    assert!(site.read("index.html").contains("/hello.html"));
    assert!(site.read("sitemap.xml").contains(&format!("{BASE_URL}/hello.html")));
}

#[test]
fn second_run_rewrites_nothing() {
    let site = hello_site();
    let generator = site.generator();
    generator.run(&Target::All).unwrap();
    let before = site.read("hello.html");

    let report = generator.run(&Target::All).unwrap();
    assert_eq!(report.written, 0);
    assert!(report.unchanged > 0);
    assert_eq!(report.removed, 0);
    assert_eq!(site.read("hello.html"), before);
}

#[test]
fn shared_image_is_exported_once() {
    let body = format!(r#"<img src="{}">"#, storage_url("tok-shared", "shared.png"));
    let mut a = article(1, "first", &body);
    let mut b = article(2, "second", &body);
    a.blob_ids = vec![3];
    b.blob_ids = vec![3];
    let site = Site::new(Snapshot {
        articles: vec![a, b],
        ..Snapshot::default()
    });
    site.store.insert_blob(image_asset(3, "tok-shared", "shared.png"), png_bytes());

    let report = site.generator().run(&Target::All).unwrap();

    assert_eq!(report.blobs_exported, 1);
    assert_eq!(site.uploads(), vec!["3-shared.png"]);
    assert!(site.read("first.html").contains("/uploads/3-shared.png"));
    assert!(site.read("second.html").contains("/uploads/3-shared.png"));
}

#[test]
fn corrupt_image_is_exported_as_original() {
    let body = format!(r#"<img src="{}">"#, storage_url("tok-bad", "bad.png"));
    let mut a = article(1, "corrupt", &body);
    a.blob_ids = vec![9];
    let site = Site::new(Snapshot {
        articles: vec![a],
        ..Snapshot::default()
    });
    site.store.insert_blob(image_asset(9, "tok-bad", "bad.png"), b"not a png".to_vec());

    let report = site.generator().run(&Target::All).unwrap();

    assert_eq!(report.blobs_exported, 1);
    assert_eq!(report.blobs_degraded, 1);
    assert_eq!(std::fs::read(site.output().join("uploads/9-bad.png")).unwrap(), b"not a png");
    assert!(site.read("corrupt.html").contains("/uploads/9-bad.png"));
}

#[test]
fn unknown_storage_reference_is_left_alone() {
    let body = format!(r#"<img src="{}">"#, storage_url("tok-gone", "gone.png"));
    let site = Site::new(Snapshot {
        articles: vec![article(1, "orphan", &body)],
        ..Snapshot::default()
    });

    site.generator().run(&Target::All).unwrap();

    assert!(site.read("orphan.html").contains(&storage_url("tok-gone", "gone.png")));
    assert!(site.uploads().is_empty());
}

#[test]
fn unpublished_article_is_cleaned_up() {
    let mut a = article(1, "keep", "<p>keep</p>");
    let mut b = article(2, "drop", "<p>drop</p>");
    a.tag_ids = vec![5];
    b.tag_ids = vec![5];
    let site = Site::new(Snapshot {
        articles: vec![a, b],
        tags: vec![tag(5, "notes", "Notes")],
        ..Snapshot::default()
    });
    let generator = site.generator();
    generator.run(&Target::All).unwrap();
    assert!(site.exists("drop.html"));
    assert!(site.read("tags/notes.html").contains("/drop.html"));

    site.store.update(|s| {
        if let Some(b) = s.articles.iter_mut().find(|a| a.id == 2) {
            b.status = PublishStatus::Draft;
        }
    });
    let report = generator.run(&Target::Article(2)).unwrap();

    assert!(!site.exists("drop.html"));
    assert!(site.exists("keep.html"));
    assert!(report.removed >= 1);
    assert!(!site.read("index.html").contains("/drop.html"));
    assert!(!site.read("tags/notes.html").contains("/drop.html"));
    assert!(!site.read("search.json").contains("/drop.html"));
}

#[test]
fn article_prefix_nests_files() {
    let site = Site::new(Snapshot {
        articles: vec![article(1, "nested", "<p>x</p>")],
        ..Snapshot::default()
    });
    let mut config = site.config();
    config.site.article_route_prefix = Some("posts".into());
    site.generator_with(config).run(&Target::All).unwrap();

    assert!(site.exists("posts/nested.html"));
    assert!(!site.exists("nested.html"));
    assert!(site.read("index.html").contains("/posts/nested.html"));
}

#[test]
fn redirect_rule_replaces_article_page() {
    let site = Site::new(Snapshot {
        articles: vec![article(1, "old", "<p>old</p>")],
        redirects: vec![Redirect {
            regex: "^/old$".into(),
            replacement: "/new".into(),
            permanent: false,
            enabled: true,
        }],
        ..Snapshot::default()
    });
    site.generator().run(&Target::All).unwrap();

    let page = site.read("old.html");
    assert!(page.contains("url=/new"));
    assert!(page.contains("noindex"));
    assert!(site.read("redirects.js").contains(r#""regex":"^/old$""#));
    assert_eq!(site.read("_redirects"), "/old /new 302");
}

#[test]
fn static_files_are_copied_and_pruned() {
    let site = Site::new(Snapshot::default());
    let source = site.tmp.path().join("storage/static");
    std::fs::create_dir_all(source.join("docs")).unwrap();
    std::fs::write(source.join("docs/cv.pdf"), b"%PDF-1.4").unwrap();
    std::fs::write(source.join("old.txt"), b"bye").unwrap();
    let generator = site.generator();

    generator.run(&Target::All).unwrap();
    assert!(site.exists("static/docs/cv.pdf"));
    assert!(site.exists("static/old.txt"));

    std::fs::remove_file(source.join("old.txt")).unwrap();
    let report = generator.run(&Target::All).unwrap();
    assert!(!site.exists("static/old.txt"));
    assert_eq!(report.removed, 1);
}
