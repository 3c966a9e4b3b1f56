//! HTTP surface tests against the in-memory store backend

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tokio::net::TcpListener;

use spage_cli::{AppState, NodeConfig};
use spage_store::memory::encode_directory;
use spage_store::{car, AnyStore, Cid, CidCodec, MemoryStore, PageStore};

// Helper to spawn a server on a random port over a shared memory store
async fn spawn_server(max_upload_bytes: usize) -> (String, Arc<AnyStore>) {
    let store = Arc::new(AnyStore::Memory(MemoryStore::new()));
    let config = NodeConfig {
        max_upload_bytes,
        ..Default::default()
    };
    let state = Arc::new(AppState::new(config, Arc::clone(&store)));
    let app = spage_cli::routes::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), store)
}

// A minimal one-page archive: root directory with an index file
fn page_archive(content: &[u8]) -> (bytes::Bytes, Cid, Cid) {
    let index_cid = spage_store::hash_cid(content, CidCodec::Raw);
    let dir: BTreeMap<String, Cid> = [("index.html".to_string(), index_cid)].into();
    let dir_bytes = encode_directory(&dir).unwrap();
    let root = spage_store::hash_cid(&dir_bytes, CidCodec::DagCbor);
    let archive = car::encode(
        vec![root],
        vec![(root, dir_bytes), (index_cid, content.to_vec())],
    )
    .unwrap();
    (archive, root, index_cid)
}

fn upload_form(archive: bytes::Bytes) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(archive.to_vec())
        .file_name("site.car")
        .mime_str("application/vnd.ipld.car")
        .unwrap();
    reqwest::multipart::Form::new().part("file", part)
}

#[tokio::test]
async fn info_reports_version() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let res = client.get(format!("{base_url}/info")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn responses_carry_permissive_cors() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let res = client
        .get(format!("{base_url}/info"))
        .header("Origin", "https://example.org")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn upload_then_read_page() {
    let (base_url, store) = spawn_server(1024 * 1024).await;
    let client = Client::new();
    let (archive, root, index_cid) = page_archive(b"<html>carol</html>");

    // upload stages the archive
    let res = client
        .post(format!("{base_url}/page?name=carol.eth"))
        .multipart(upload_form(archive))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["cid"], root.to_string());

    // a staged pin for the name exists
    let staged = store.pin_list("spg_staged_carol.eth_").await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].cid, root);

    // the reduced archive preserves the root identity
    let res = client
        .get(format!("{base_url}/page?cid={root}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/vnd.ipld.car"
    );
    let (roots, blocks) = car::decode(&res.bytes().await.unwrap()).unwrap();
    assert_eq!(roots, vec![root]);
    assert!(blocks.iter().any(|(c, _)| *c == index_cid));

    // raw block fetch round-trips the index file
    let res = client
        .get(format!("{base_url}/file?cid={index_cid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/vnd.ipld.raw"
    );
    assert_eq!(res.bytes().await.unwrap().as_ref(), b"<html>carol</html>");
}

#[tokio::test]
async fn page_requires_a_cid() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let res = client.get(format!("{base_url}/page")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{base_url}/page?cid=notacid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_content_is_not_found() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();
    let ghost = spage_store::hash_cid(b"never stored", CidCodec::DagCbor);

    let res = client
        .get(format!("{base_url}/page?cid={ghost}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{base_url}/file?cid={ghost}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let form = reqwest::multipart::Form::new().text("other", "value");
    let res = client
        .post(format!("{base_url}/page?name=carol.eth"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (base_url, store) = spawn_server(64).await;
    let client = Client::new();
    let (archive, _, _) = page_archive(&[b'x'; 256]);

    let res = client
        .post(format!("{base_url}/page?name=carol.eth"))
        .multipart(upload_form(archive))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.pin_list("spg_staged_").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_archive_is_an_import_failure() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let res = client
        .post(format!("{base_url}/page?name=carol.eth"))
        .multipart(upload_form(bytes::Bytes::from_static(b"not a car file")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn history_of_unknown_name_is_not_found() {
    let (base_url, _) = spawn_server(1024 * 1024).await;
    let client = Client::new();

    let res = client
        .get(format!("{base_url}/history?name=ghost.eth"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{base_url}/history"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
