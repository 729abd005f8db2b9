mod helpers;

use memorial::memorial::store;
use memorial::memorial::types::ImageReference;
use memorial::pipeline::reclaim::reclaim_orphans;
use memorial::storage::Bucket;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn only_unreferenced_object_is_deleted() {
    let tmp = TempDir::new().unwrap();
    let bucket = helpers::test_bucket(&tmp);
    let mut conn = helpers::test_db();

    bucket.upload("x.jpg", b"x", None, true).await.unwrap();
    bucket.upload("y.jpg", b"y", None, true).await.unwrap();

    let mut draft = helpers::sample_draft("Jane Doe");
    draft.images = vec![ImageReference::owned("x.jpg", bucket.public_url("x.jpg"), "x")];
    store::insert_memorial(&mut conn, &draft).unwrap();

    let memorials = store::list_memorials(&conn).unwrap();
    let report = reclaim_orphans(&bucket, &memorials, false).await.unwrap();

    assert_eq!(report.deleted, vec!["y.jpg".to_string()]);
    assert_eq!(report.message(), "Successfully deleted 1 orphaned images.");
    let remaining: Vec<String> = bucket.list().await.unwrap().into_iter().map(|o| o.path).collect();
    assert_eq!(remaining, vec!["x.jpg".to_string()]);
}

#[tokio::test]
async fn second_sweep_deletes_nothing() {
    let tmp = TempDir::new().unwrap();
    let bucket = helpers::test_bucket(&tmp);
    bucket.upload("stray.png", b"s", None, true).await.unwrap();

    let first = reclaim_orphans(&bucket, &[], false).await.unwrap();
    assert_eq!(first.deleted.len(), 1);

    let second = reclaim_orphans(&bucket, &[], false).await.unwrap();
    assert!(second.orphaned.is_empty());
    assert!(second.deleted.is_empty());
    assert_eq!(second.message(), "No orphaned images to delete.");
}

#[tokio::test]
async fn records_holding_signed_urls_protect_their_objects() {
    let tmp = TempDir::new().unwrap();
    let bucket = helpers::test_bucket(&tmp);
    let mut conn = helpers::test_db();

    bucket.upload("u1/1700000000000_portrait.png", b"p", None, true).await.unwrap();
    bucket.upload("legacy.jpg", b"l", None, true).await.unwrap();
    bucket.upload("orphan.jpg", b"o", None, true).await.unwrap();

    // A legacy record that stored display URLs instead of paths.
    let signed = bucket
        .create_signed_url("u1/1700000000000_portrait.png", Duration::from_secs(60))
        .await
        .unwrap();
    let mut draft = helpers::sample_draft("Legacy Record");
    draft.images = vec![ImageReference::external(signed, "portrait")];
    draft.primary_image_url = Some(bucket.public_url("legacy.jpg"));
    store::insert_memorial(&mut conn, &draft).unwrap();

    let memorials = store::list_memorials(&conn).unwrap();
    let report = reclaim_orphans(&bucket, &memorials, false).await.unwrap();

    assert_eq!(report.deleted, vec!["orphan.jpg".to_string()]);
    for obj in bucket.list().await.unwrap() {
        assert_ne!(obj.path, "orphan.jpg");
    }
    assert!(bucket.exists("u1/1700000000000_portrait.png").await.unwrap());
    assert!(bucket.exists("legacy.jpg").await.unwrap());
}

#[tokio::test]
async fn dry_run_reports_without_deleting() {
    let tmp = TempDir::new().unwrap();
    let bucket = helpers::test_bucket(&tmp);
    bucket.upload("a.jpg", b"a", None, true).await.unwrap();
    bucket.upload("nested/b.jpg", b"b", None, true).await.unwrap();

    let report = reclaim_orphans(&bucket, &[], true).await.unwrap();
    assert_eq!(report.orphaned, vec!["a.jpg".to_string(), "nested/b.jpg".to_string()]);
    assert!(report.deleted.is_empty());
    assert_eq!(bucket.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn entries_with_null_titles_still_protect_their_objects() {
    let tmp = TempDir::new().unwrap();
    let bucket = helpers::test_bucket(&tmp);
    let mut conn = helpers::test_db();
    bucket.upload("x.jpg", b"x", None, true).await.unwrap();

    let stored = store::insert_memorial(&mut conn, &helpers::sample_draft("Null Title")).unwrap();
    let raw = serde_json::json!([{"url": bucket.public_url("x.jpg"), "title": null}]).to_string();
    conn.execute(
        "UPDATE memorials SET images = ?1 WHERE id = ?2",
        rusqlite::params![raw, stored.id],
    )
    .unwrap();

    let memorials = store::list_memorials(&conn).unwrap();
    assert_eq!(memorials[0].images.len(), 1);
    let report = reclaim_orphans(&bucket, &memorials, false).await.unwrap();

    assert!(report.deleted.is_empty());
    assert!(bucket.exists("x.jpg").await.unwrap());
}
