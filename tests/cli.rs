mod support;

use std::fs;
use std::path::Path;

use lopdf::{Document, Object, Stream, dictionary};
use predicates::prelude::*;
use support::storage_with_manifest;

fn bookgrab() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgrab");
    cmd.env_remove("BOOKGRAB_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_page_pdf(path: &Path, marker: &str) -> anyhow::Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = format!("% {marker}\n0 0 100 100 re f\n");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
        "MediaBox" => Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ]),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.save(path)?;
    Ok(())
}

#[test]
fn check_without_manifest_fails() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    bookgrab()
        .args(["check", "--dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("manifest not found"));
    Ok(())
}

#[test]
fn check_reports_counts_and_writes_report() -> anyhow::Result<()> {
    let (temp, layout, _) = storage_with_manifest(&["Premessa", "Capitolo 1", "Capitolo 2"])?;
    fs::write(temp.path().join("page_001_p1.pdf"), vec![b'%'; 2000])?;
    fs::write(temp.path().join("page_002_p2.pdf"), vec![b'%'; 10])?;

    bookgrab()
        .args(["check", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("book-1: 1/3 pages ok, 2 failed"))
        .stdout(predicate::str::contains("Capitolo 1 (p2)"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(layout.report_path())?)?;
    assert_eq!(report["failed_count"], 2);
    assert_eq!(report["failed_pages"][0]["id"], "p2");
    Ok(())
}

#[test]
fn cleanup_is_a_dry_run_unless_live() -> anyhow::Result<()> {
    let (temp, _layout, _) = storage_with_manifest(&["Premessa"])?;
    fs::write(temp.path().join("page_001_p1.pdf"), vec![b'%'; 2000])?;
    let stray = temp.path().join("page_001_old.pdf");
    fs::write(&stray, b"stale")?;

    bookgrab()
        .args(["cleanup", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("would remove"))
        .stdout(predicate::str::contains("page_001_old.pdf"));
    assert!(stray.exists());

    bookgrab()
        .args(["cleanup", "--live", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));
    assert!(!stray.exists());
    assert!(temp.path().join("page_001_p1.pdf").exists());
    assert!(temp.path().join("manifest.json").exists());
    Ok(())
}

#[test]
fn merge_writes_one_pdf_per_chapter() -> anyhow::Result<()> {
    let (temp, layout, _) =
        storage_with_manifest(&["Premessa", "Capitolo 1", "1.1 Intro", "Capitolo 2"])?;
    write_page_pdf(&temp.path().join("page_001_p1.pdf"), "page-1")?;
    write_page_pdf(&temp.path().join("page_002_p2.pdf"), "page-2")?;
    write_page_pdf(&temp.path().join("page_003_p3.pdf"), "page-3")?;

    bookgrab()
        .args(["merge", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 chapter(s) merged, 1 failed"));

    let processed = layout.processed_dir();
    let preface = Document::load(processed.join("preface.pdf"))?;
    assert_eq!(preface.get_pages().len(), 1);
    let chapter = Document::load(processed.join("01_capitolo_1.pdf"))?;
    assert_eq!(chapter.get_pages().len(), 2);
    assert!(!processed.join("02_capitolo_2.pdf").exists());

    let chapters: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(processed.join("chapters.json"))?)?;
    assert_eq!(chapters.as_array().map(Vec::len), Some(3));
    assert_eq!(chapters[1]["start_page"], 2);
    assert_eq!(chapters[1]["end_page"], 3);
    Ok(())
}

#[test]
fn retry_with_nothing_missing_is_a_noop() -> anyhow::Result<()> {
    let (temp, _layout, _) = storage_with_manifest(&["Premessa"])?;
    fs::write(temp.path().join("page_001_p1.pdf"), vec![b'%'; 2000])?;

    bookgrab()
        .args(["retry", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to retry"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let (temp, _layout, _) = storage_with_manifest(&["Premessa"])?;
    bookgrab()
        .env("RUST_LOG", "debug")
        .args(["check", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn download_captures_every_page_with_configured_command() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let toc = temp.path().join("toc.json");
    fs::write(
        &toc,
        r#"[{"id":"a1","title":"Premessa"},{"id":"b2","title":"Capitolo 1"},{"id":"c3","title":"Sezione"}]"#,
    )?;
    let config = temp.path().join("bookgrab.yaml");
    fs::write(
        &config,
        r#"batch_delay_ms: 0
capture:
  reader_url: "https://reader.example/{book_id}/{page_id}"
  command:
    program: sh
    args: ["-c", "head -c 2000 /dev/zero > \"$1\"", "sh", "{out}"]
"#,
    )?;
    let out = temp.path().join("book");

    bookgrab()
        .arg("--config")
        .arg(&config)
        .args(["download", "--book-id", "book-9", "--toc"])
        .arg(&toc)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("download: 3/3 pages captured, 0 failed"))
        .stdout(predicate::str::contains("status: 3/3 pages ok, 0 failed"));

    assert!(out.join("manifest.json").is_file());
    assert!(out.join("status_report.json").is_file());
    assert_eq!(fs::metadata(out.join("page_002_b2.pdf"))?.len(), 2000);

    bookgrab()
        .arg("--config")
        .arg(&config)
        .args(["download", "--book-id", "book-9", "--toc"])
        .arg(&toc)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}
