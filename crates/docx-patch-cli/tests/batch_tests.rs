use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use docx_patch_cli::batch::{run_batch, BatchManifest, JobOutcome, JobSpec};
use docx_patch_core::{DocxPatcher, SubstitutionRule};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn school_body(cases: u32, hospitalizations: u32) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
            r#"<w:p><w:r><w:t>Without vaccination we expect {} cases and {} hospitalizations.</w:t></w:r></w:p>"#,
            r#"</w:body></w:document>"#
        ),
        cases, hospitalizations
    )
}

fn write_docx(path: &Path, body: &str) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(body.as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn read_body(path: &Path) -> String {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

fn highlight_rules() -> Vec<SubstitutionRule> {
    vec![
        SubstitutionRule::new("([0-9]+) cases", "\\1 cases"),
        SubstitutionRule::new("([0-9]+) hospitalizations", "\\1 hospitalizations"),
    ]
}

fn job(dir: &Path, name: &str, input: &str) -> JobSpec {
    JobSpec {
        name: name.to_string(),
        input: dir.join(input),
        output: dir.join("out").join(format!("{name}.docx")),
        rules: highlight_rules(),
        bold_red: true,
        literal: false,
    }
}

#[tokio::test]
async fn test_batch_continues_after_failure() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("out")).unwrap();
    write_docx(&dir.path().join("lincoln.docx"), &school_body(42, 3));
    write_docx(&dir.path().join("jefferson.docx"), &school_body(17, 1));
    fs::write(dir.path().join("broken.docx"), b"not an archive").unwrap();

    let manifest = BatchManifest {
        jobs: vec![
            job(dir.path(), "lincoln", "lincoln.docx"),
            job(dir.path(), "broken", "broken.docx"),
            job(dir.path(), "missing", "missing.docx"),
            job(dir.path(), "jefferson", "jefferson.docx"),
        ],
    };
    let patcher = Arc::new(DocxPatcher::new_with_base_dir(dir.path().join("work")).unwrap());

    let summary = run_batch(patcher, manifest, 2).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    let names: Vec<&str> = summary.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["lincoln", "broken", "missing", "jefferson"]);

    match &summary.jobs[1].outcome {
        JobOutcome::Failed { kind, .. } => assert_eq!(kind, "corrupt_archive"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    match &summary.jobs[2].outcome {
        JobOutcome::Failed { kind, .. } => assert_eq!(kind, "not_found"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    match &summary.jobs[0].outcome {
        JobOutcome::Patched { report } => assert_eq!(report.matches, vec![1, 1]),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let lincoln = read_body(&dir.path().join("out/lincoln.docx"));
    assert!(lincoln.contains("<w:color w:val=\"FF0000\"/></w:rPr><w:t xml:space=\"preserve\">42 cases</w:t>"));
    assert!(lincoln.contains("3 hospitalizations</w:t>"));
    let jefferson = read_body(&dir.path().join("out/jefferson.docx"));
    assert!(jefferson.contains("17 cases</w:t>"));

    assert!(!dir.path().join("out/broken.docx").exists());
    assert!(!dir.path().join("out/missing.docx").exists());
    assert_eq!(fs::read_dir(dir.path().join("work")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_batch() {
    let dir = TempDir::new().unwrap();
    let patcher = Arc::new(DocxPatcher::new_with_base_dir(dir.path()).unwrap());

    let summary = run_batch(patcher, BatchManifest::default(), 4).await;

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.jobs.is_empty());
}

#[test]
fn test_manifest_paths_resolve_against_manifest_dir() {
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("jobs.json");
    fs::write(
        &manifest_path,
        r#"{
            "jobs": [
                {
                    "name": "school-001",
                    "input": "rendered/school-001.docx",
                    "output": "reports/school-001.docx",
                    "bold_red": true,
                    "rules": [{"find": "([0-9]+) cases", "replace": "\\1 cases"}]
                }
            ]
        }"#,
    )
    .unwrap();

    let manifest = BatchManifest::load(&manifest_path).unwrap();

    assert_eq!(manifest.jobs.len(), 1);
    let job = &manifest.jobs[0];
    assert_eq!(job.input, dir.path().join("rendered/school-001.docx"));
    assert_eq!(job.output, dir.path().join("reports/school-001.docx"));
    assert!(job.bold_red);
    assert!(!job.literal);
    assert_eq!(job.rules, vec![SubstitutionRule::new("([0-9]+) cases", "\\1 cases")]);
}

#[test]
fn test_manifest_rejects_bad_json() {
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("jobs.json");
    fs::write(&manifest_path, "{ not json").unwrap();

    let err = BatchManifest::load(&manifest_path).unwrap_err();
    assert!(err.to_string().contains("Invalid manifest JSON"));
}
