//! Router-level scenarios driven through `oneshot`, with a temp database, the
//! local media backend and a stub `ffprobe`.

use std::path::Path;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Duration;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use super::*;
use crate::config::TokenSettings;
use crate::media::{LocalMediaBackend, testing::install_ffprobe_stub};
use crate::store::UserRecord;
use crate::store::testing::{seed_user, seed_video};

const BOUNDARY: &str = "vidtube-test-boundary";

struct Harness {
    _dir: TempDir,
    state: AppState,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        Self::with_probe("12.48", 0).await
    }

    async fn with_probe(output: &str, status: i32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = install_ffprobe_stub(dir.path(), output, status);
        let settings = Settings {
            host: "127.0.0.1".into(),
            port: 8000,
            database_url: dir.path().join("data"),
            db_name: "vidtube".into(),
            cors_origin: None,
            tokens: TokenSettings {
                access_secret: "a".repeat(32),
                access_expiry: Duration::minutes(15),
                refresh_secret: "r".repeat(32),
                refresh_expiry: Duration::days(10),
            },
            cloudinary: None,
            media_root: dir.path().join("media"),
            public_url: "http://media.test".into(),
            temp_upload_dir: dir.path().join("tmp"),
            ffprobe_path: ffprobe.clone(),
            max_upload_bytes: 8 * 1024 * 1024,
            production: false,
        };

        let store = EntityStore::open(&settings.database_path()).await.unwrap();
        let backend = LocalMediaBackend::new(&settings.media_root, "http://media.test").unwrap();
        let state = AppState {
            store: Arc::new(store),
            media: Arc::new(MediaDelegate::new(Arc::new(backend), ffprobe)),
            tokens: Arc::new(TokenIssuer::new(&settings.tokens)),
            settings: Arc::new(settings),
        };
        let app = router(state.clone());
        Self {
            _dir: dir,
            state,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Seeds an account directly in the store and returns it with a bearer
    /// credential.
    async fn user(&self, username: &str) -> (UserRecord, String) {
        let user = seed_user(&self.state.store, username).await;
        let token = self.state.tokens.issue_access(&user).unwrap();
        (user, token)
    }

    fn temp_dir(&self) -> &Path {
        &self.state.settings.temp_upload_dir
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    parts: &[Part<'_>],
) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn registration<'a>(username: &'a str, email: &'a str) -> Vec<Part<'a>> {
    vec![
        Part::Text("fullName", "Alice Liddell"),
        Part::Text("email", email),
        Part::Text("username", username),
        Part::Text("password", "wonderland"),
        Part::File("avatar", "alice.png", b"fake png bytes"),
    ]
}

fn upload_parts<'a>() -> Vec<Part<'a>> {
    vec![
        Part::Text("title", "t"),
        Part::Text("description", "d"),
        Part::File("video", "clip.mp4", b"not really an mp4"),
        Part::File("thumbnail", "thumb.jpg", b"not really a jpeg"),
    ]
}

fn temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn registering_twice_conflicts() {
    let harness = Harness::new().await;

    let (status, body) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice", "alice@x.com"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert!(body["data"]["user"].get("passwordHash").is_none());
    assert!(body["data"]["accessToken"].as_str().is_some());
    assert!(
        body["data"]["user"]["avatar"]
            .as_str()
            .unwrap()
            .starts_with("http://media.test/media/avatars/")
    );

    let (status, _) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice2", "ALICE@x.com"),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "same email, different case");

    let (status, _) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice", "other@x.com"),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "same username");
    assert_eq!(temp_files(harness.temp_dir()), 0, "temp uploads cleaned up");
}

#[tokio::test]
async fn registration_requires_every_field() {
    let harness = Harness::new().await;
    let (status, body) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &[
                Part::Text("fullName", "   "),
                Part::Text("email", "a@x.com"),
                Part::Text("username", "a"),
                Part::Text("password", "pw"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "All fields are required");
}

#[tokio::test]
async fn upload_scenario_lists_unpublished_video_on_channel() {
    let harness = Harness::new().await;

    let (status, registered) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice", "alice@x.com"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let alice_id = registered["data"]["user"]["id"].as_str().unwrap().to_string();

    let (status, login) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/login",
            None,
            json!({ "email": "alice@x.com", "password": "wonderland" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{login}");
    let token = login["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, uploaded) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/video/upload-a-video",
            Some(&token),
            &upload_parts(),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{uploaded}");
    assert_eq!(uploaded["data"]["duration"], 12);
    assert_eq!(uploaded["data"]["isPublished"], false);
    assert!(uploaded["data"].get("videoFileId").is_none());
    assert_eq!(temp_files(harness.temp_dir()), 0);

    let (status, listing) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/channel/{alice_id}/videos"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = listing["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["duration"].as_i64().unwrap() > 0);
    assert_eq!(items[0]["isPublished"], false);
    assert_eq!(items[0]["owner"]["username"], "alice");

    // Unpublished videos stay out of the public feed.
    let (_, feed) = harness
        .send(empty_request("GET", "/api/v1/video", Some(&token)))
        .await;
    assert_eq!(feed["data"]["total"], 0);

    let video_url = items[0]["videoFile"].as_str().unwrap();
    let media_path = video_url.strip_prefix("http://media.test").unwrap();
    let (status, _) = harness
        .send(empty_request("GET", media_path, None))
        .await;
    assert_eq!(status, StatusCode::OK, "local media is served");
}

#[tokio::test]
async fn unreadable_upload_is_rejected_without_storing_anything() {
    let harness = Harness::with_probe("N/A", 0).await;
    let (alice, token) = harness.user("alice").await;

    let (status, body) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/video/upload-a-video",
            Some(&token),
            &upload_parts(),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{body}");

    let stats = harness.state.store.channel_stats(&alice.id).await.unwrap();
    assert_eq!(stats.total_videos, 0);
    assert_eq!(temp_files(harness.temp_dir()), 0);
    let stored = std::fs::read_dir(harness.state.settings.media_root.join("videos"))
        .unwrap()
        .count();
    assert_eq!(stored, 0, "nothing uploaded before the probe passes");
}

#[tokio::test]
async fn two_users_liking_a_video() {
    let harness = Harness::new().await;
    let (owner, _) = harness.user("owner").await;
    let (_, bob) = harness.user("bob").await;
    let (_, carol) = harness.user("carol").await;
    let video = seed_video(&harness.state.store, &owner.id, "clip").await;
    let uri = format!("/api/v1/like/video/{}", video.id);

    let (status, body) = harness.send(empty_request("PATCH", &uri, Some(&bob))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "liked": true, "likeCount": 1 }));

    let (_, body) = harness.send(empty_request("PATCH", &uri, Some(&carol))).await;
    assert_eq!(body["data"]["likeCount"], 2);

    let (_, body) = harness.send(empty_request("PATCH", &uri, Some(&bob))).await;
    assert_eq!(body["data"], json!({ "liked": false, "likeCount": 1 }));

    let (_, liked) = harness
        .send(empty_request("GET", "/api/v1/like/videos", Some(&carol)))
        .await;
    assert_eq!(liked["data"]["items"][0]["video"]["id"], video.id);

    let missing = format!("/api/v1/like/tweet/{}", uuid::Uuid::new_v4());
    let (status, _) = harness.send(empty_request("PATCH", &missing, Some(&bob))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subscription_toggle_and_self_subscription() {
    let harness = Harness::new().await;
    let (alice, alice_token) = harness.user("alice").await;
    let (bob, bob_token) = harness.user("bob").await;

    let (status, body) = harness
        .send(empty_request(
            "PATCH",
            &format!("/api/v1/subscription/{}", alice.id),
            Some(&alice_token),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot subscribe to your own channel");

    let uri = format!("/api/v1/subscription/{}", alice.id);
    let (status, body) = harness.send(empty_request("PATCH", &uri, Some(&bob_token))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"], json!({ "subscribed": true, "subscriberCount": 1 }));

    let (_, profile) = harness
        .send(empty_request("GET", "/api/v1/user/c/alice", Some(&bob_token)))
        .await;
    assert_eq!(profile["data"]["subscribersCount"], 1);
    assert_eq!(profile["data"]["isSubscribed"], true);

    let (_, subscribers) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/subscription/{}/subscribers", alice.id),
            Some(&alice_token),
        ))
        .await;
    assert_eq!(subscribers["data"]["items"][0]["id"], bob.id);

    let (status, body) = harness.send(empty_request("PATCH", &uri, Some(&bob_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscribed"], false);
    assert_eq!(body["data"]["subscriberCount"], 0);
}

#[tokio::test]
async fn non_owner_mutations_are_forbidden() {
    let harness = Harness::new().await;
    let (alice, alice_token) = harness.user("alice").await;
    let (_, bob_token) = harness.user("bob").await;

    let (status, tweet) = harness
        .send(json_request(
            "POST",
            "/api/v1/tweet/create-tweet",
            Some(&alice_token),
            json!({ "content": "first" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let tweet_id = tweet["data"]["id"].as_str().unwrap();

    let (status, _) = harness
        .send(json_request(
            "PATCH",
            &format!("/api/v1/tweet/update-tweet/{tweet_id}"),
            Some(&bob_token),
            json!({ "content": "hijacked" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = harness.state.store.find_tweet(tweet_id).await.unwrap().unwrap();
    assert_eq!(stored.content, "first");

    let video = seed_video(&harness.state.store, &alice.id, "clip").await;
    for (method, uri) in [
        ("DELETE", format!("/api/v1/video/{}", video.id)),
        ("PATCH", format!("/api/v1/video/toggle/publish/{}", video.id)),
    ] {
        let (status, _) = harness.send(empty_request(method, &uri, Some(&bob_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
    }
    assert!(harness.state.store.find_video(&video.id).await.unwrap().is_some());

    let (status, published) = harness
        .send(empty_request(
            "PATCH",
            &format!("/api/v1/video/toggle/publish/{}", video.id),
            Some(&alice_token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["data"]["isPublished"], true);
}

#[tokio::test]
async fn non_owner_cannot_touch_comments_playlists_or_videos() {
    let harness = Harness::new().await;
    let (alice, alice_token) = harness.user("alice").await;
    let (bob, bob_token) = harness.user("bob").await;
    let store = &harness.state.store;
    let video = seed_video(store, &alice.id, "clip").await;
    let bobs_video = seed_video(store, &bob.id, "bobs").await;

    let comment = store.create_comment(&video.id, &alice.id, "mine").await.unwrap();
    let update_comment = format!("/api/v1/comment/update-comment/{}/{}", video.id, comment.id);
    for body in [json!({ "content": "hijacked" }), json!({})] {
        let (status, _) = harness
            .send(json_request("PATCH", &update_comment, Some(&bob_token), body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    let (status, _) = harness
        .send(empty_request(
            "DELETE",
            &format!("/api/v1/comment/delete-comment/{}/{}", video.id, comment.id),
            Some(&bob_token),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = store.find_comment(&comment.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "mine");

    let playlist = store.create_playlist(&alice.id, "faves", "desc").await.unwrap();
    store.add_playlist_video(&playlist.id, &video.id).await.unwrap();
    let playlist_uri = format!("/api/v1/playlist/{}", playlist.id);
    for body in [json!({ "name": "stolen" }), json!({})] {
        let (status, _) = harness
            .send(json_request("PATCH", &playlist_uri, Some(&bob_token), body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    for (method, uri) in [
        ("PATCH", format!("{playlist_uri}/add/{}", bobs_video.id)),
        ("PATCH", format!("{playlist_uri}/remove/{}", video.id)),
        ("DELETE", playlist_uri.clone()),
    ] {
        let (status, _) = harness.send(empty_request(method, &uri, Some(&bob_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
    }
    let detail = store.find_playlist_detail(&playlist.id).await.unwrap().unwrap();
    assert_eq!(detail.name, "faves");
    assert_eq!(detail.videos.len(), 1);
    assert_eq!(detail.videos[0].id, video.id);

    let video_uri = format!("/api/v1/video/{}", video.id);
    for body in [json!({ "title": "stolen" }), json!({})] {
        let (status, _) = harness
            .send(json_request("PATCH", &video_uri, Some(&bob_token), body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    let thumbnail_uri = format!("{video_uri}/thumbnail");
    for parts in [
        vec![Part::File("thumbnail", "new.jpg", b"other jpeg".as_slice())],
        vec![Part::Text("note", "no file")],
    ] {
        let (status, _) = harness
            .send(multipart_request("PATCH", &thumbnail_uri, Some(&bob_token), &parts))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    let stored = store.find_video(&video.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "clip");
    assert_eq!(stored.thumbnail_id, "clip-thumb");
    assert_eq!(temp_files(harness.temp_dir()), 0);

    // The owner still gets the body checked.
    let (status, body) = harness
        .send(json_request("PATCH", &video_uri, Some(&alice_token), json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Title or description is required");
}

#[tokio::test]
async fn identical_uploads_keep_their_own_media() {
    let harness = Harness::new().await;
    let (_, token) = harness.user("alice").await;

    let mut uploads = Vec::new();
    for _ in 0..2 {
        let (status, uploaded) = harness
            .send(multipart_request(
                "POST",
                "/api/v1/video/upload-a-video",
                Some(&token),
                &upload_parts(),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{uploaded}");
        uploads.push(uploaded["data"].clone());
    }
    assert_ne!(uploads[0]["videoFile"], uploads[1]["videoFile"]);

    let (status, _) = harness
        .send(empty_request(
            "DELETE",
            &format!("/api/v1/video/{}", uploads[0]["id"].as_str().unwrap()),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    for field in ["videoFile", "thumbnail"] {
        let url = uploads[1][field].as_str().unwrap();
        let (status, _) = harness
            .send(empty_request("GET", url.strip_prefix("http://media.test").unwrap(), None))
            .await;
        assert_eq!(status, StatusCode::OK, "{field} of the surviving video");

        let gone = uploads[0][field].as_str().unwrap();
        let (status, _) = harness
            .send(empty_request("GET", gone.strip_prefix("http://media.test").unwrap(), None))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{field} of the deleted video");
    }
}

#[tokio::test]
async fn unexpected_file_parts_are_skipped() {
    let harness = Harness::new().await;
    let (alice, token) = harness.user("alice").await;

    let mut parts = upload_parts();
    parts.push(Part::File("videoFile", "copy.mp4", b"a second copy of the video"));
    parts.push(Part::File("poster", "poster.png", b"unused"));
    let (status, body) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/video/upload-a-video",
            Some(&token),
            &parts,
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(temp_files(harness.temp_dir()), 0);
    let stored = std::fs::read_dir(harness.state.settings.media_root.join("videos"))
        .unwrap()
        .count();
    assert_eq!(stored, 1);

    let (status, body) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/video/upload-a-video",
            Some(&token),
            &[
                Part::Text("title", "t"),
                Part::Text("description", "d"),
                Part::File("videoFile", "clip.mp4", b"wrong field name"),
                Part::File("thumbnail", "thumb.jpg", b"jpeg"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Video file is required");
    let stats = harness.state.store.channel_stats(&alice.id).await.unwrap();
    assert_eq!(stats.total_videos, 1);
}

#[tokio::test]
async fn password_change_checks_the_stored_hash() {
    let harness = Harness::new().await;
    let (_, registered) = harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice", "alice@x.com"),
        ))
        .await;
    let token = registered["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, me) = harness
        .send(empty_request("GET", "/api/v1/user/current-user", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(me["data"].get("passwordHash").is_none());
    assert!(me["data"].get("refreshToken").is_none());

    let change = |current: &str| {
        json_request(
            "POST",
            "/api/v1/user/change-password",
            Some(&token),
            json!({ "currentPassword": current, "newPassword": "looking-glass" }),
        )
    };
    let (status, _) = harness.send(change("not-it")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = harness.send(change("wonderland")).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    for (password, expected) in [
        ("wonderland", StatusCode::UNAUTHORIZED),
        ("looking-glass", StatusCode::OK),
    ] {
        let (status, _) = harness
            .send(json_request(
                "POST",
                "/api/v1/user/login",
                None,
                json!({ "email": "alice@x.com", "password": password }),
            ))
            .await;
        assert_eq!(status, expected, "login with {password}");
    }
}

#[tokio::test]
async fn comment_path_must_match_its_video() {
    let harness = Harness::new().await;
    let (alice, token) = harness.user("alice").await;
    let first = seed_video(&harness.state.store, &alice.id, "first").await;
    let second = seed_video(&harness.state.store, &alice.id, "second").await;

    let (status, comment) = harness
        .send(json_request(
            "POST",
            &format!("/api/v1/comment/{}", first.id),
            Some(&token),
            json!({ "content": "nice" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["data"]["id"].as_str().unwrap();

    let (status, _) = harness
        .send(json_request(
            "PATCH",
            &format!("/api/v1/comment/update-comment/{}/{comment_id}", second.id),
            Some(&token),
            json!({ "content": "edited" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .send(empty_request(
            "DELETE",
            &format!("/api/v1/comment/delete-comment/{}/{comment_id}", second.id),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = harness
        .send(json_request(
            "PATCH",
            &format!("/api/v1/comment/update-comment/{}/{comment_id}", first.id),
            Some(&token),
            json!({ "content": "edited" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["content"], "edited");
}

#[tokio::test]
async fn tweet_pages_return_remainder_then_empty() {
    let harness = Harness::new().await;
    let (alice, token) = harness.user("alice").await;
    for n in 0..25 {
        harness
            .state
            .store
            .create_tweet(&alice.id, &format!("tweet {n}"))
            .await
            .unwrap();
    }

    let uri = |page: u32| format!("/api/v1/tweet/user-tweets/{}?page={page}&limit=10", alice.id);
    let (_, last) = harness.send(empty_request("GET", &uri(3), Some(&token))).await;
    assert_eq!(last["data"]["items"].as_array().unwrap().len(), 5);
    assert_eq!(last["data"]["totalPages"], 3);
    assert_eq!(last["data"]["total"], 25);

    let (status, beyond) = harness.send(empty_request("GET", &uri(4), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(beyond["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(beyond["data"]["totalPages"], 3);

    let (status, _) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/tweet/user-tweets/{}?page=0", alice.id),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_playlist_add_is_rejected() {
    let harness = Harness::new().await;
    let (alice, token) = harness.user("alice").await;
    let video = seed_video(&harness.state.store, &alice.id, "clip").await;

    let (status, playlist) = harness
        .send(json_request(
            "POST",
            "/api/v1/playlist",
            Some(&token),
            json!({ "name": "faves", "description": "the best" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{playlist}");
    let playlist_id = playlist["data"]["id"].as_str().unwrap();
    let add = format!("/api/v1/playlist/{playlist_id}/add/{}", video.id);

    let (status, _) = harness.send(empty_request("PATCH", &add, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = harness.send(empty_request("PATCH", &add, Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Video already in playlist");

    let (_, detail) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/playlist/{playlist_id}"),
            Some(&token),
        ))
        .await;
    assert_eq!(detail["data"]["videos"].as_array().unwrap().len(), 1);
    assert_eq!(detail["data"]["videos"][0]["id"], video.id);
}

#[tokio::test]
async fn credentials_are_required_and_verified() {
    let harness = Harness::new().await;

    let (status, body) = harness
        .send(empty_request("GET", "/api/v1/user/current-user", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized request");

    let (status, body) = harness
        .send(empty_request("GET", "/api/v1/user/current-user", Some("garbage")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid access token");

    let (_, token) = harness.user("alice").await;
    let (status, body) = harness
        .send(empty_request("GET", "/api/v1/user/current-user", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");

    let (status, _) = harness
        .send(empty_request("GET", "/api/v1/video/not-a-uuid", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_rotates_and_rejects_reuse() {
    let harness = Harness::new().await;
    harness
        .send(multipart_request(
            "POST",
            "/api/v1/user/register",
            None,
            &registration("alice", "alice@x.com"),
        ))
        .await;

    let (_, login) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/login",
            None,
            json!({ "username": "alice", "password": "wonderland" }),
        ))
        .await;
    let first = login["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, refreshed) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/refresh-token",
            None,
            json!({ "refreshToken": first }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{refreshed}");
    assert_ne!(refreshed["data"]["refreshToken"], first);

    let (status, _) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/refresh-token",
            None,
            json!({ "refreshToken": first }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "rotated token is single-use");

    let (status, _) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/login",
            None,
            json!({ "email": "alice@x.com", "password": "wrong" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness
        .send(json_request(
            "POST",
            "/api/v1/user/login",
            None,
            json!({ "email": "nobody@x.com", "password": "wonderland" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn watching_records_history_and_views() {
    let harness = Harness::new().await;
    let (alice, token) = harness.user("alice").await;
    let video = seed_video(&harness.state.store, &alice.id, "clip").await;

    let (status, watched) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/video/{}", video.id),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(watched["data"]["views"], 1);

    let (_, history) = harness
        .send(empty_request("GET", "/api/v1/user/watch-history", Some(&token)))
        .await;
    assert_eq!(history["data"][0]["id"], video.id);
    assert_eq!(history["data"][0]["owner"]["username"], "alice");

    let (_, stats) = harness
        .send(empty_request(
            "GET",
            &format!("/api/v1/channel/{}/stats", alice.id),
            Some(&token),
        ))
        .await;
    assert_eq!(stats["data"]["totalVideos"], 1);
    assert_eq!(stats["data"]["totalViews"], 1);
}

#[tokio::test]
async fn healthcheck_and_unknown_routes() {
    let harness = Harness::new().await;
    let (status, body) = harness
        .send(empty_request("GET", "/api/v1/healthcheck", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = harness.send(empty_request("GET", "/api/v2/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
