mod helpers;

use helpers::{FakeExtractor, FakeSearch};
use memorial::memorial::types::ImageReference;
use memorial::storage::Bucket;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn service(tmp: &TempDir) -> memorial::service::MemorialService {
    helpers::test_service(
        tmp,
        Arc::new(FakeSearch::default()),
        Arc::new(FakeExtractor::default()),
        helpers::test_config(),
    )
}

#[tokio::test]
async fn external_selection_is_persisted_in_selection_order() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp);
    let host = helpers::spawn_image_host().await;
    service.bucket().upload("owned.jpg", b"o", None, true).await.unwrap();

    let mut draft = helpers::sample_draft("Mona Haddad");
    draft.images = vec![
        helpers::external(format!("{host}/ok.png")),
        ImageReference::owned("owned.jpg", service.bucket().public_url("owned.jpg"), "mine"),
        helpers::external(format!("{host}/missing.jpg")),
    ];
    draft.primary_image_url = Some(format!("{host}/ok.png"));

    let stored = service.submit(draft).await.unwrap();

    assert_eq!(stored.images.len(), 2);
    let first = stored.images[0].path.clone().unwrap();
    assert!(first.ends_with(".png"));
    assert_eq!(stored.images[1].path.as_deref(), Some("owned.jpg"));
    assert_eq!(stored.primary_image_path.as_deref(), Some(first.as_str()));
    assert_eq!(
        stored.primary_image_url,
        Some(service.bucket().public_url(&first))
    );
    assert_eq!(service.bucket().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_external_primary_falls_back_to_first_image() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp);
    let host = helpers::spawn_image_host().await;
    service.bucket().upload("kept.jpg", b"k", None, true).await.unwrap();

    let mut draft = helpers::sample_draft("Omar Saleh");
    draft.images = vec![
        ImageReference::owned("kept.jpg", service.bucket().public_url("kept.jpg"), "kept"),
        helpers::external(format!("{host}/missing.jpg")),
    ];
    draft.primary_image_url = Some(format!("{host}/missing.jpg"));

    let stored = service.submit(draft).await.unwrap();
    assert_eq!(stored.images.len(), 1);
    assert_eq!(stored.primary_image_path.as_deref(), Some("kept.jpg"));
}

#[tokio::test]
async fn resubmitting_a_signed_record_keeps_stable_paths() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp);
    service.bucket().upload("a.jpg", b"a", None, true).await.unwrap();

    let mut draft = helpers::sample_draft("Lina Awad");
    draft.images = vec![ImageReference::owned("a.jpg", service.bucket().public_url("a.jpg"), "a")];
    let stored = service.submit(draft).await.unwrap();

    // The detail view hands out signed URLs; an edit sends them back.
    let shown = service.get_memorial(&stored.id).await.unwrap();
    assert!(shown.images[0].url.contains("token="));
    let mut edit: memorial::memorial::types::MemorialDraft = shown.into();
    for image in &mut edit.images {
        image.path = None;
    }
    edit.story = "Updated story.".into();

    let updated = service.submit(edit).await.unwrap();
    assert_eq!(updated.id, stored.id);
    assert_eq!(updated.story, "Updated story.");
    assert_eq!(updated.images[0].path.as_deref(), Some("a.jpg"));
    assert_eq!(updated.images[0].url, service.bucket().public_url("a.jpg"));
    assert_eq!(updated.primary_image_path.as_deref(), Some("a.jpg"));
}

#[tokio::test]
async fn detail_view_signs_images_for_the_configured_ttl() {
    let tmp = TempDir::new().unwrap();
    let mut config = helpers::test_config();
    config.display.detail_ttl_secs = 120;
    let service = helpers::test_service(
        &tmp,
        Arc::new(FakeSearch::default()),
        Arc::new(FakeExtractor::default()),
        config,
    );
    service.bucket().upload("a.jpg", b"a", None, true).await.unwrap();
    let mut draft = helpers::sample_draft("Yusuf Amin");
    draft.images = vec![ImageReference::owned("a.jpg", "https://stale.example/a.jpg", "a")];
    let stored = service.submit(draft).await.unwrap();

    let before = chrono::Utc::now().timestamp() as u64;
    let shown = service.get_memorial(&stored.id).await.unwrap();
    let url = reqwest::Url::parse(&shown.images[0].url).unwrap();
    let expires: u64 = url
        .query_pairs()
        .find(|(k, _)| k == "expires")
        .map(|(_, v)| v.parse().unwrap())
        .unwrap();
    assert!(expires >= before + 120);
    assert!(expires <= before + 120 + Duration::from_secs(5).as_secs());
}
