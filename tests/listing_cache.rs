mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use traveler_api::cache::{CacheError, CacheOutcome, ResponseCache};

use common::{
    body_bytes, body_json, empty_request, get_request, json_request, multipart_request, setup,
};

#[tokio::test]
async fn first_listing_fills_cache_and_second_is_served_from_it() {
    let test = setup();
    test.app
        .clone()
        .oneshot(empty_request("POST", "/travelers"))
        .await
        .unwrap();
    assert!(!test.cache_file().exists());

    let first = test
        .app
        .clone()
        .oneshot(get_request("/travelers"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers().get("content-type").unwrap(),
        "application/json"
    );
    let first_body = body_bytes(first).await;
    assert_eq!(test.service.list_call_count(), 1);
    assert!(test.cache_file().exists());

    let listing: serde_json::Value = serde_json::from_slice(&first_body).unwrap();
    assert_eq!(listing["status"], "success");
    assert_eq!(listing["data"].as_array().unwrap().len(), 1);

    let second = test
        .app
        .clone()
        .oneshot(get_request("/travelers?page=3&limit=1&summary=true"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, second_body);
    assert_eq!(test.service.list_call_count(), 1);

    let metrics = test.state.metrics.encode().unwrap();
    assert!(metrics.contains("listing_cache_lookups_total{outcome=\"hit\"} 1"));
    assert!(metrics.contains("listing_cache_lookups_total{outcome=\"miss\"} 1"));
}

#[tokio::test]
async fn existing_artifact_is_served_verbatim() {
    let test = setup();
    let artifact = br#"{"status":"success","data":[{"id":77}]}"#;
    std::fs::write(test.cache_file(), artifact).unwrap();

    let response = test
        .app
        .clone()
        .oneshot(get_request("/travelers?page=2&limit=10"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, artifact.to_vec());
    assert_eq!(test.service.list_call_count(), 0);
}

#[tokio::test]
async fn mutations_invalidate_the_listing() {
    let test = setup();
    test.app
        .clone()
        .oneshot(empty_request("POST", "/travelers"))
        .await
        .unwrap();
    test.app
        .clone()
        .oneshot(get_request("/travelers"))
        .await
        .unwrap();
    assert!(test.cache_file().exists());

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/travelers/1",
            json!({ "field": "first_name", "value": "Ada" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!test.cache_file().exists());

    let response = test
        .app
        .clone()
        .oneshot(get_request("/travelers"))
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert_eq!(listing["data"][0]["first_name"], "Ada");
    assert_eq!(test.service.list_call_count(), 2);
}

#[tokio::test]
async fn failed_mutation_keeps_the_listing() {
    let test = setup();
    test.app
        .clone()
        .oneshot(get_request("/travelers"))
        .await
        .unwrap();
    assert!(test.cache_file().exists());

    let response = test
        .app
        .clone()
        .oneshot(empty_request("DELETE", "/travelers/404"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(test.cache_file().exists());
}

#[tokio::test]
async fn listing_failure_is_a_bare_500() {
    let test = setup();
    test.service.fail_list.store(true, Ordering::SeqCst);

    let response = test
        .app
        .clone()
        .oneshot(get_request("/travelers"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_bytes(response).await.is_empty());
    assert!(!test.cache_file().exists());
}

#[tokio::test]
async fn upload_io_failure_reports_detail_in_envelope() {
    let test = setup();
    test.app
        .clone()
        .oneshot(empty_request("POST", "/travelers"))
        .await
        .unwrap();
    test.service.fail_uploads.store(true, Ordering::SeqCst);

    let response = test
        .app
        .clone()
        .oneshot(multipart_request(
            "/travelers/1/files",
            Some("photo"),
            Some(("photo.jpg", b"jpeg".as_slice())),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({ "status": "error", "message": "Failed to upload file: disk quota exceeded" })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_compute_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResponseCache::new(dir.path()));
    let computations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let computations = computations.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("static_travelers", || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, CacheError>(b"[1,2,3]".to_vec())
                })
                .await
                .unwrap()
        }));
    }

    let mut misses = 0;
    for handle in handles {
        let (outcome, body) = handle.await.unwrap();
        assert_eq!(body, b"[1,2,3]".to_vec());
        if outcome == CacheOutcome::Miss {
            misses += 1;
        }
    }

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(misses, 1);
}

#[tokio::test]
async fn invalidate_reports_whether_an_artifact_existed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::new(dir.path());

    assert!(!cache.invalidate("static_travelers").await.unwrap());
    cache
        .get_or_compute("static_travelers", || async { Ok::<_, CacheError>(b"{}".to_vec()) })
        .await
        .unwrap();
    assert!(cache.contains("static_travelers").await);
    assert!(cache.invalidate("static_travelers").await.unwrap());
    assert!(!cache.contains("static_travelers").await);
}

#[tokio::test]
async fn compute_failure_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::new(dir.path());

    let result = cache
        .get_or_compute("static_travelers", || async {
            Err::<Vec<u8>, _>(CacheError::Io(std::io::Error::other("boom")))
        })
        .await;

    assert!(result.is_err());
    assert!(!cache.contains("static_travelers").await);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
