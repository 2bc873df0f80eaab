//! Search-contract tests: tenant isolation, the score floor, ordering,
//! and dangling-candidate handling.

use super::{create_app, drain_tasks, run_embedding};
use crate::app::UploadRequest;
use crate::genai::Embedder;

fn upload_req(name: &str, org: &str) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        org_id: org.to_string(),
        user_id: "u1".to_string(),
        category: None,
        data: b"ignored".to_vec(),
    }
}

/// Upload a category-`other` file (so the name is the surrogate) and
/// embed it right away.
fn embed_named(h: &super::Harness, name: &str, org: &str) -> crate::files::FileRecord {
    let record = h.app.upload(upload_req(name, org)).unwrap();
    run_embedding(&h.app, record.id).unwrap();
    record
}

#[test]
fn search_never_returns_another_tenants_files() {
    let h = create_app();

    let mine = embed_named(&h, "budget report", "org1");
    embed_named(&h, "annual report", "org2");
    drain_tasks(&h.task_rx);

    let hits = h.app.search_semantic("org1", "report").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file.id, mine.id);
    assert_eq!(hits[0].file.org_id, "org1");

    // a prefix of an org id is a different tenant entirely
    let hits = h.app.search_semantic("org", "report").unwrap();
    assert!(hits.is_empty());
}

#[test]
fn scores_at_or_below_the_floor_are_dropped() {
    let h = create_app();

    embed_named(&h, "invoice october", "org1");
    embed_named(&h, "zebra pancakes", "org1");

    let hits = h.app.search_semantic("org1", "invoice").unwrap();

    // the unrelated file scores 0.0 against the query and is suppressed
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file.name, "invoice october");
    assert!(hits[0].score > 0.40);
}

#[test]
fn results_come_back_in_descending_score_order() {
    let h = create_app();

    embed_named(&h, "invoice", "org1");
    embed_named(&h, "invoice october", "org1");

    let hits = h.app.search_semantic("org1", "invoice").unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
    // the exact-name match wins
    assert_eq!(hits[0].file.name, "invoice");
}

#[test]
fn dangling_candidates_are_dropped_silently() {
    let h = create_app();

    // a vector whose record never existed (index lagging behind deletes)
    let embedding = h.embedder.embed("invoice october").unwrap();
    h.app.vectors.persist(999, "org1", embedding).unwrap();

    let hits = h.app.search_semantic("org1", "invoice").unwrap();
    assert!(hits.is_empty());
}

#[test]
fn soft_deleted_files_do_not_surface_in_search() {
    let h = create_app();

    let record = embed_named(&h, "invoice october", "org1");

    h.app.soft_delete(record.id).unwrap();
    assert!(h.app.search_semantic("org1", "invoice").unwrap().is_empty());

    h.app.restore(record.id).unwrap();
    let hits = h.app.search_semantic("org1", "invoice").unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn query_embedding_failure_propagates() {
    let h = create_app();
    embed_named(&h, "invoice october", "org1");

    h.embedder.fail_next(1);
    assert!(h.app.search_semantic("org1", "invoice").is_err());
}
