//! Post API integration tests.

mod common;

use chrono::DateTime;
use blog_server::models::Claims;
use common::{cover_part, post_form, stored_covers, TestServer, PNG_BYTES};
use reqwest::multipart;
use serde_json::Value;
use uuid::Uuid;

#[tokio::test]
async fn test_create_post_and_fetch_cover() {
    let server = TestServer::start().await;
    let (token, id) = server.login("alice@example.com").await;

    let response = server
        .client()
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", Some(cover_part("cover.png"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let post: Value = response.json().await.unwrap();
    assert_eq!(post["title"], "T");
    assert_eq!(post["summary"], "S");
    assert_eq!(post["content"], "C");
    assert_eq!(post["author"], id.as_str());
    assert!(post["createdAt"].is_string());

    let cover = post["cover"].as_str().unwrap();
    assert!(cover.starts_with(&server.url("/blobs/blog/blog_covers/")));
    assert!(cover.contains("-cover.png?exp="));

    let response = server.client().get(cover).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert!(response.headers()["cache-control"]
        .to_str()
        .unwrap()
        .contains("max-age=3600"));
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn test_create_post_requires_fields_and_file() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;
    let client = server.client();

    let response = client
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", None))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("  ", "S", "C", Some(cover_part("cover.png"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_create_post_rejects_non_image_cover() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;

    let part = multipart::Part::bytes(b"just some text".to_vec())
        .file_name("notes.txt")
        .mime_str("text/plain")
        .unwrap();

    let response = server
        .client()
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", Some(part)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn test_create_post_rejects_oversized_cover() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;

    let mut data = PNG_BYTES.to_vec();
    data.resize(1024 * 1024 + 1, 0);
    let part = multipart::Part::bytes(data)
        .file_name("big.png")
        .mime_str("image/png")
        .unwrap();

    let response = server
        .client()
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", Some(part)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_list_returns_newest_twenty() {
    let server = TestServer::start().await;
    let (token, id) = server.login("alice@example.com").await;

    for i in 0..25 {
        server.create_post(&token, &format!("post {}", i)).await;
    }

    let response = server.client().get(server.url("/post")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let posts: Vec<Value> = response.json().await.unwrap();
    assert_eq!(posts.len(), 20);
    assert_eq!(posts[0]["title"], "post 24");
    assert_eq!(posts[19]["title"], "post 5");

    for pair in posts.windows(2) {
        let newer = DateTime::parse_from_rfc3339(pair[0]["createdAt"].as_str().unwrap()).unwrap();
        let older = DateTime::parse_from_rfc3339(pair[1]["createdAt"].as_str().unwrap()).unwrap();
        assert!(newer > older);
    }

    assert_eq!(posts[0]["author"]["id"], id.as_str());
    assert_eq!(posts[0]["author"]["username"], "alice@example.com");
}

#[tokio::test]
async fn test_get_post_is_stable() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;
    let created = server.create_post(&token, "T").await;
    let url = server.url(&format!("/post/{}", created["id"].as_str().unwrap()));

    let first: Value = server.client().get(&url).send().await.unwrap().json().await.unwrap();
    let second: Value = server.client().get(&url).send().await.unwrap().json().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["title"], "T");
    assert_eq!(first["author"]["username"], "alice@example.com");
}

#[tokio::test]
async fn test_get_missing_post_is_404() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .get(server.url(&format!("/post/{}", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(server.url("/post/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_author_can_edit_post() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;
    let created = server.create_post(&token, "T").await;

    let form = multipart::Form::new()
        .text("id", created["id"].as_str().unwrap().to_string())
        .text("title", "New title");

    let response = server
        .client()
        .put(server.url("/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["title"], "New title");
    assert_eq!(updated["summary"], "S");
    assert_eq!(updated["cover"], created["cover"]);
    assert_eq!(updated["author"], created["author"]);
    assert_eq!(updated["createdAt"], created["createdAt"]);
}

#[tokio::test]
async fn test_edit_with_new_cover() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;
    let created = server.create_post(&token, "T").await;

    let form = multipart::Form::new()
        .text("id", created["id"].as_str().unwrap().to_string())
        .part("file", cover_part("second.png"));

    let response = server
        .client()
        .put(server.url("/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let updated: Value = response.json().await.unwrap();
    let cover = updated["cover"].as_str().unwrap();
    assert_ne!(updated["cover"], created["cover"]);
    assert!(cover.contains("-second.png?exp="));

    let response = server.client().get(cover).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_non_author_edit_is_rejected() {
    let server = TestServer::start().await;
    let (alice, _) = server.login("alice@example.com").await;
    let (bob, _) = server.login("bob@example.com").await;
    let created = server.create_post(&alice, "T").await;
    let id = created["id"].as_str().unwrap().to_string();

    let bodies = [
        multipart::Form::new().text("id", id.clone()),
        multipart::Form::new()
            .text("id", id.clone())
            .text("title", "Hijacked"),
        multipart::Form::new()
            .text("id", id.clone())
            .part("file", cover_part("evil.png")),
    ];

    for form in bodies {
        let response = server
            .client()
            .put(server.url("/post"))
            .bearer_auth(&bob)
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["error"], "not_author");
        assert_eq!(json["message"], "you are not the author");
    }

    let current: Value = server
        .client()
        .get(server.url(&format!("/post/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["title"], "T");
}

#[tokio::test]
async fn test_edit_missing_post_is_404() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;

    let form = multipart::Form::new()
        .text("id", Uuid::new_v4().to_string())
        .text("title", "x");

    let response = server
        .client()
        .put(server.url("/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_cover_upload_failure_is_storage_error() {
    let server = TestServer::start_with_failing_blobs().await;
    let (token, _) = server.login("alice@example.com").await;

    let response = server
        .client()
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", Some(cover_part("cover.png"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "storage_error");

    let posts: Vec<Value> = server
        .client()
        .get(server.url("/post"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_failed_post_write_discards_cover() {
    let server = TestServer::start_with_failing_post_writes().await;
    let (token, _) = server.login("alice@example.com").await;

    let response = server
        .client()
        .post(server.url("/post"))
        .bearer_auth(&token)
        .multipart(post_form("T", "S", "C", Some(cover_part("cover.png"))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "internal_error");

    assert!(stored_covers(&server).is_empty());
}

#[tokio::test]
async fn test_non_author_oversized_cover_is_not_author() {
    let server = TestServer::start().await;
    let (alice, _) = server.login("alice@example.com").await;
    let (bob, _) = server.login("bob@example.com").await;
    let created = server.create_post(&alice, "T").await;

    let mut data = PNG_BYTES.to_vec();
    data.resize(1024 * 1024 + 1, 0);
    let part = multipart::Part::bytes(data)
        .file_name("big.png")
        .mime_str("image/png")
        .unwrap();
    let form = multipart::Form::new()
        .text("id", created["id"].as_str().unwrap().to_string())
        .part("file", part);

    let response = server
        .client()
        .put(server.url("/post"))
        .bearer_auth(&bob)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "not_author");
    assert_eq!(stored_covers(&server).len(), 2);
}

#[tokio::test]
async fn test_author_oversized_cover_is_too_large() {
    let server = TestServer::start().await;
    let (token, _) = server.login("alice@example.com").await;
    let created = server.create_post(&token, "T").await;

    let mut data = PNG_BYTES.to_vec();
    data.resize(1024 * 1024 + 1, 0);
    let part = multipart::Part::bytes(data)
        .file_name("big.png")
        .mime_str("image/png")
        .unwrap();
    let form = multipart::Form::new()
        .text("id", created["id"].as_str().unwrap().to_string())
        .part("file", part);

    let response = server
        .client()
        .put(server.url("/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_id_only_token_can_create_post() {
    let server = TestServer::start().await;
    let token = server
        .state
        .tokens
        .encode(&Claims::for_id("external-uid"))
        .unwrap();

    let post = server.create_post(&token, "T").await;
    assert_eq!(post["author"], "external-uid");
}
