//! Filesystem document source

use pretty_assertions::assert_eq;
use qa_artifact::SuiteId;
use qa_generation::{DirectoryDocumentSource, DocumentSource};
use tempfile::TempDir;

fn source(dir: &TempDir) -> DirectoryDocumentSource {
    DirectoryDocumentSource::new(dir.path().join("blobs"), dir.path().join("sessions"))
}

#[tokio::test]
async fn fetch_copies_blobs_into_the_suite() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("blobs")).unwrap();
    std::fs::write(dir.path().join("blobs/spec.txt"), "The system shall log in users.").unwrap();
    std::fs::write(dir.path().join("blobs/manual.txt"), "Extracted manual text.").unwrap();
    let suite = SuiteId::new("suite-a");
    let source = source(&dir);

    let report = source
        .fetch(
            &suite,
            &["spec.txt".into(), "uploads/manual.pdf".into(), "gone.txt".into(), "slides.pptx".into()],
        )
        .await
        .unwrap();

    assert_eq!(report.stored, vec!["spec.txt".to_string(), "manual.txt".to_string()]);
    assert_eq!(report.missing, vec!["gone.txt".to_string(), "slides.pptx".to_string()]);
    assert!(dir.path().join("sessions/suite-a/docs/manual.txt").exists());

    let docs = source.documents(&suite, 1_000).await.unwrap();
    let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["manual.txt", "spec.txt"]);
}

#[tokio::test]
async fn listing_skips_non_text_and_truncates() {
    let dir = TempDir::new().unwrap();
    let docs_dir = dir.path().join("sessions/suite-b/docs");
    std::fs::create_dir_all(&docs_dir).unwrap();
    std::fs::write(docs_dir.join("long.txt"), "abcdefghij").unwrap();
    std::fs::write(docs_dir.join("image.png"), [0u8, 1, 2]).unwrap();

    let docs = source(&dir).documents(&SuiteId::new("suite-b"), 4).await.unwrap();

    assert_eq!(docs.len(), 1);
    assert!(docs[0].text.starts_with("abcd"));
    assert!(docs[0].text.contains("truncated"));
}

#[tokio::test]
async fn unknown_suite_has_no_documents() {
    let dir = TempDir::new().unwrap();
    let docs = source(&dir).documents(&SuiteId::new("nobody"), 100).await.unwrap();
    assert!(docs.is_empty());
}
