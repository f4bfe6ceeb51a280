//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use staticpress::config::SiteConfig;
use staticpress::content::{Snapshot, SnapshotStore};
use staticpress::generate::{Generator, RunOptions};
use staticpress::types::{Article, BinaryAsset, BlobId, ItemId, PublishStatus, Tag};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "https://blog.example.com";

/// A working directory plus an in-memory content store.
pub struct Site {
    pub tmp: TempDir,
    pub store: Arc<SnapshotStore>,
}

impl Site {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
            store: Arc::new(SnapshotStore::from_snapshot(snapshot)),
        }
    }

    pub fn config(&self) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.site.url = BASE_URL.to_string();
        config.assets.precompile = false;
        config
    }

    pub fn generator(&self) -> Generator {
        self.generator_with(self.config())
    }

    pub fn generator_with(&self, config: SiteConfig) -> Generator {
        Generator::new(config, self.tmp.path(), self.store.clone(), self.store.clone()).with_options(
            RunOptions {
                precompile: false,
                deploy: false,
            },
        )
    }

    pub fn output(&self) -> PathBuf {
        self.tmp.path().join("public")
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.output().join(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.output().join(rel).exists()
    }

    pub fn uploads(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.output().join("uploads")) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap()
}

pub fn article(id: ItemId, slug: &str, body: &str) -> Article {
    Article {
        id,
        slug: slug.into(),
        title: slug.replace('-', " "),
        description: format!("About {slug}"),
        status: PublishStatus::Publish,
        body: body.into(),
        blob_ids: vec![],
        tag_ids: vec![],
        created_at: at(id as u32),
        updated_at: at(id as u32),
    }
}

pub fn tag(id: ItemId, slug: &str, name: &str) -> Tag {
    Tag {
        id,
        slug: slug.into(),
        name: name.into(),
    }
}

pub fn image_asset(id: BlobId, token: &str, filename: &str) -> BinaryAsset {
    BinaryAsset {
        id,
        token: token.into(),
        filename: filename.into(),
        content_type: "image/png".into(),
        byte_size: 0,
        key: String::new(),
    }
}

/// Dynamic-storage URL as the editor embeds it.
pub fn storage_url(token: &str, filename: &str) -> String {
    format!("/rails/active_storage/blobs/redirect/{token}/{filename}")
}

/// A small real PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(32, 24, |x, y| image::Rgb([(x * 8) as u8, (y * 10) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}
