//! Test harness for isolated batch-pipeline execution.
//!
//! `TestHarness` wires a complete environment against temp storage and
//! an in-memory database: upload builders (zip archives, manifests,
//! minimal PDFs), a `BatchService`, and synchronous helpers to drive a
//! job to its terminal state without a runtime.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use facturo::db::Database;
use facturo::pipeline::BatchResult;
use facturo::{BatchConfig, BatchService, SubmitError, SubmitReceipt, Submission};

/// Default manifest header used by most scenarios (English spellings).
pub const HEADER_EN: &str =
    "filename,invoiceNumber,invoiceDate,sellerName,buyerName,totalHT,totalTVA,totalTTC";

/// Builds a minimal but valid single-page PDF.
pub fn minimal_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        b"BT ET".to_vec(),
    )));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save minimal pdf");
    buffer
}

/// A well-formed manifest row pairing `filename` with invoice `number`.
pub fn row(filename: &str, number: &str) -> String {
    format!(
        "{},{},2026-01-15,Acme SARL,Client SAS,100.00,20.00,120.00",
        filename, number
    )
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub uploads_dir: PathBuf,
    pub work_root: PathBuf,
    pub db: Database,
    pub service: BatchService,
    pub config: Arc<BatchConfig>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config_overrides(|_| {})
    }

    /// Create a harness with config tweaks (e.g. a lower item ceiling).
    pub fn with_config_overrides<F: FnOnce(&mut BatchConfig)>(overrides: F) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let uploads_dir = temp_dir.path().join("uploads");
        let work_root = temp_dir.path().join("work");
        std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

        let mut config = BatchConfig {
            work_root: work_root.clone(),
            ..Default::default()
        };
        overrides(&mut config);
        let config = Arc::new(config);

        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let service = BatchService::from_config(db.clone(), Arc::clone(&config));

        Self {
            temp_dir,
            uploads_dir,
            work_root,
            db,
            service,
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a zip archive containing the given entries.
    pub fn build_archive(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.uploads_dir.join(name);
        let file = std::fs::File::create(&path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        for (entry_name, content) in entries {
            writer
                .start_file(*entry_name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(content).expect("write entry");
        }
        writer.finish().expect("finish archive");
        path
    }

    /// Writes an archive of minimal PDFs under the given entry names.
    pub fn build_pdf_archive(&self, name: &str, entry_names: &[&str]) -> PathBuf {
        let pdf = minimal_pdf();
        let entries: Vec<(&str, &[u8])> =
            entry_names.iter().map(|n| (*n, pdf.as_slice())).collect();
        self.build_archive(name, &entries)
    }

    pub fn write_manifest(&self, name: &str, content: &str) -> PathBuf {
        let path = self.uploads_dir.join(name);
        std::fs::write(&path, content).expect("write manifest");
        path
    }

    /// A manifest with the default English header and well-formed rows.
    pub fn write_rows(&self, name: &str, rows: &[(&str, &str)]) -> PathBuf {
        let mut content = String::from(HEADER_EN);
        content.push('\n');
        for (filename, number) in rows {
            content.push_str(&row(filename, number));
            content.push('\n');
        }
        self.write_manifest(name, &content)
    }

    pub fn submission(&self, archive: PathBuf, manifest: PathBuf) -> Submission {
        Submission {
            archive_path: archive,
            manifest_path: manifest,
            user_id: "test-user".to_string(),
            credential_id: Some("test-key".to_string()),
            origin_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("facturo-tests/1.0".to_string()),
        }
    }

    pub fn submit(
        &self,
        archive: PathBuf,
        manifest: PathBuf,
    ) -> Result<SubmitReceipt, SubmitError> {
        self.service.submit(self.submission(archive, manifest))
    }

    /// Drives a submitted job to its terminal state on the current
    /// thread (no runtime involved).
    pub fn run(&self, public_id: &str) -> BatchResult {
        self.service.runner().process(public_id)
    }

    /// Submit and run in one step.
    pub fn submit_and_run(
        &self,
        archive: PathBuf,
        manifest: PathBuf,
    ) -> (SubmitReceipt, BatchResult) {
        let receipt = self
            .submit(archive, manifest)
            .expect("submission should validate");
        let result = self.run(&receipt.public_id);
        (receipt, result)
    }

    /// Entry names inside the job's output archive.
    pub fn output_entries(&self, result: &BatchResult) -> Vec<String> {
        let path = result
            .output_path
            .as_ref()
            .expect("result has an output archive");
        let file = std::fs::File::open(path).expect("open output archive");
        let archive = zip::ZipArchive::new(file).expect("read output archive");
        archive.file_names().map(str::to_string).collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
