use proptest::prelude::*;
use qa_artifact::{
    ArtifactKey, ArtifactKind, ArtifactStore, ContentDoc, InMemoryArtifactStore, NewArtifact,
    RowFilter, SuiteId,
};
use serde_json::json;
use std::collections::HashMap;

/// Write one artifact as the sole active row for its natural key
async fn write_active(store: &InMemoryArtifactStore, suite: &SuiteId, version: u32, key: ArtifactKey) {
    let kind = key.kind();
    let filter = RowFilter::suite(suite)
        .with_active(true)
        .with_natural_key(key.natural_key());
    store.deactivate(kind, &filter).await.unwrap();
    let content = ContentDoc::new().with("version", json!(version));
    store
        .insert(kind, NewArtifact::new(suite.clone(), version, key, content))
        .await
        .unwrap();
}

fn key_for(kind_idx: usize, code_idx: usize) -> ArtifactKey {
    let code = format!("REQ-{code_idx}");
    match kind_idx {
        0 => ArtifactKey::requirement(code),
        1 => ArtifactKey::test_design(["integration", "e2e", "unit"][code_idx % 3]),
        2 => ArtifactKey::viewpoint(Some(code), "Boundary values"),
        _ => ArtifactKey::test_case(code),
    }
}

proptest! {
    #[test]
    fn prop_single_active_per_natural_key(
        writes in proptest::collection::vec((0..4usize, 0..5usize, 1..6u32), 1..60)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = InMemoryArtifactStore::new();
            let suite = SuiteId::new("suite-prop");
            for (kind_idx, code_idx, version) in writes {
                write_active(&store, &suite, version, key_for(kind_idx, code_idx)).await;
            }

            for kind in ArtifactKind::ALL {
                let active = store
                    .query(kind, &RowFilter::suite(&suite).with_active(true))
                    .await
                    .unwrap();
                let mut per_key: HashMap<_, usize> = HashMap::new();
                for row in &active {
                    *per_key.entry(row.natural_key()).or_default() += 1;
                }
                assert!(per_key.values().all(|count| *count == 1), "{kind}: {per_key:?}");
            }
        });
    }
}

#[tokio::test]
async fn suites_are_isolated() {
    let store = InMemoryArtifactStore::new();
    let a = SuiteId::new("a");
    let b = SuiteId::new("b");
    write_active(&store, &a, 1, ArtifactKey::requirement("REQ-1")).await;
    write_active(&store, &b, 1, ArtifactKey::requirement("REQ-1")).await;

    let active_a = store
        .query(ArtifactKind::Requirement, &RowFilter::suite(&a).with_active(true))
        .await
        .unwrap();
    assert_eq!(active_a.len(), 1);
    assert_eq!(store.row_count(ArtifactKind::Requirement), 2);
}

#[tokio::test]
async fn inserts_never_mutate_existing_rows() {
    let store = InMemoryArtifactStore::new();
    let suite = SuiteId::new("s");
    write_active(&store, &suite, 1, ArtifactKey::test_case("REQ-1")).await;
    let before = store.dump(ArtifactKind::TestCase);

    write_active(&store, &suite, 2, ArtifactKey::test_case("REQ-1")).await;
    let after = store.dump(ArtifactKind::TestCase);

    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].content, before[0].content);
    assert_eq!(after[0].version, 1);
    assert!(!after[0].active);
    assert!(after[1].active);
}

#[tokio::test]
async fn viewpoints_with_separator_text_stay_distinct() {
    let store = InMemoryArtifactStore::new();
    let suite = SuiteId::new("s");
    write_active(&store, &suite, 1, ArtifactKey::viewpoint(Some("A::B".into()), "C")).await;
    write_active(&store, &suite, 1, ArtifactKey::viewpoint(Some("A".into()), "B::C")).await;

    let active = store
        .query(ArtifactKind::Viewpoint, &RowFilter::suite(&suite).with_active(true))
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let snapshot = store.snapshot(ArtifactKind::Viewpoint, &suite, 1).await.unwrap();
    assert_eq!(snapshot.len(), 2);
}
