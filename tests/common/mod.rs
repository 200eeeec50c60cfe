#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use insightops::app::App;
use insightops::config::Config;
use insightops::sqlite_index::SqliteVectorIndex;
use insightops_core::embedding::EmbeddingProvider;
use insightops_core::index::VectorIndex;

pub const DIMS: usize = 4096;

/// Deterministic bag-of-words embedder: each word bumps one FNV-1a bucket.
pub struct BagOfWords;

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split_whitespace() {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Fails until `recover()` is called, then behaves like [`BagOfWords`].
#[derive(Default)]
pub struct FlakyEmbedder {
    healthy: AtomicBool,
}

impl FlakyEmbedder {
    pub fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.healthy.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        BagOfWords.embed(texts).await
    }
}

/// Config rooted in `root`: `data/`, `queue/`, `processed/`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.ingest_dir = root.join("queue");
    config.paths.processed_dir = root.join("processed");
    config.embedding.provider = "disabled".to_string();
    std::fs::create_dir_all(&config.paths.ingest_dir).unwrap();
    config
}

pub async fn sqlite_index(config: &Config) -> Arc<dyn VectorIndex> {
    let pool = insightops::db::connect(&config.paths.vectors_path())
        .await
        .unwrap();
    insightops::migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteVectorIndex::new(pool))
}

/// App over a SQLite index in `root` with the bag-of-words embedder.
pub async fn open_app(root: &Path) -> App {
    let config = test_config(root);
    let index = sqlite_index(&config).await;
    App::with_services(config, index, Arc::new(BagOfWords))
}

/// `count` distinct words `w<start>` .. `w<start + count - 1>`.
pub fn words(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("w{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A slide deck with one text frame per slide.
pub fn pptx(slides: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (i, text) in slides.iter().enumerate() {
            zip.start_file(
                format!("ppt/slides/slide{}.xml", i + 1),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                text
            );
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Minimal one-page PDF showing `phrase`, with correct xref offsets.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    pdf_pages(&[phrase])
}

/// Minimal PDF with one page per entry of `pages`, each showing its phrase
/// in Helvetica.
pub fn pdf_pages(pages: &[&str]) -> Vec<u8> {
    // 1 catalog, 2 page tree, 3 font, then a page/content pair per page
    let page_obj = |i: usize| 4 + 2 * i;
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect();

    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, phrase) in pages.iter().enumerate() {
        let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
            page_obj(i) + 1
        ));
        objects.push(format!(
            "<< /Length {} >> stream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    let size = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", size).as_bytes());
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
