//! End-to-end engine tests against a mock git-hosting API.
//!
//! Each test stands up a `wiremock` server, points the coordinator at it,
//! and asserts on both the returned results and the raw requests the
//! engine issued (tree contents, commit parents, call ordering).

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use canopy_core::model::{Leaf, Note, PullPriority, Settings, World};
use canopy_sync::pull::PullOptions;
use canopy_sync::stale::{HeadLookup, StaleCheckResult};
use canopy_sync::{
    ArchiveData, GitHubClient, PullProgress, PushRequest, SyncCoordinator, SyncSnapshot,
};

const REPO: &str = "/repos/octo/notes";

fn settings() -> Settings {
    Settings {
        token: "ghp_test".to_string(),
        repository: "octo/notes".to_string(),
        username: "octo".to_string(),
        email: "octo@example.com".to_string(),
        ..Settings::default()
    }
}

fn note(id: &str, name: &str) -> Note {
    Note {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: None,
        order: 0,
        world: World::Home,
    }
}

fn leaf(id: &str, note_id: &str, title: &str, content: &str) -> Leaf {
    Leaf {
        id: id.to_string(),
        note_id: note_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        order: 0,
        updated_at: 0,
        badge_icon: None,
        badge_color: None,
    }
}

fn blob_body(content: &str) -> Value {
    json!({
        "content": BASE64.encode(content.as_bytes()),
        "encoding": "base64",
    })
}

async fn mock_ref(server: &MockServer, sha: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/main",
            "object": { "sha": sha, "type": "commit" },
        })))
        .mount(server)
        .await;
}

async fn mock_commit(server: &MockServer, sha: &str, tree_sha: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/commits/{sha}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": sha,
            "tree": { "sha": tree_sha },
        })))
        .mount(server)
        .await;
}

async fn mock_push_writes(server: &MockServer, new_tree: &str, new_commit: &str) {
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": new_tree })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/commits")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": new_commit })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{REPO}/git/refs/heads/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ref": "refs/heads/main" })))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, suffix: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().ends_with(suffix))
        .collect()
}

fn tree_paths(request: &Request) -> Vec<String> {
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    body["tree"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["path"].as_str().unwrap().to_string())
        .collect()
}

fn push_request<'a>(
    leaves: &'a [Leaf],
    notes: &'a [Note],
    settings: &'a Settings,
    previous: &'a SyncSnapshot,
) -> PushRequest<'a> {
    PushRequest {
        leaves,
        notes,
        settings,
        operations_locked: false,
        local_metadata: None,
        archive: None,
        previous,
    }
}

#[tokio::test]
async fn push_submits_exactly_the_tracked_paths() {
    let server = MockServer::start().await;
    mock_ref(&server, "head1").await;
    mock_commit(&server, "head1", "tree1").await;
    mock_push_writes(&server, "tree2", "commit2").await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let leaves = vec![leaf("l1", "n1", "A", "alpha"), leaf("l2", "n1", "B", "beta")];
    let previous = SyncSnapshot::default();

    let coordinator = SyncCoordinator::with_base_url(server.uri());
    let result = coordinator
        .execute_push(push_request(&leaves, &notes, &settings, &previous))
        .await;

    assert!(result.success, "push failed: {}", result.message);
    assert_eq!(result.commit_sha.as_deref(), Some("commit2"));
    assert_eq!(result.changed_leaf_count, Some(2));
    assert_eq!(result.metadata_only_changed, Some(false));

    let tree_requests = requests_to(&server, "/git/trees").await;
    assert_eq!(tree_requests.len(), 1);
    let mut paths = tree_paths(&tree_requests[0]);
    paths.sort();
    assert_eq!(
        paths,
        vec!["notes/Work/A.md", "notes/Work/B.md", "notes/metadata.json"]
    );

    let commit_requests = requests_to(&server, "/git/commits").await;
    let commit_body: Value = serde_json::from_slice(&commit_requests[0].body).unwrap();
    assert_eq!(commit_body["tree"], "tree2");
    assert_eq!(commit_body["parents"], json!(["head1"]));
}

#[tokio::test]
async fn push_without_a_leaf_drops_its_path() {
    // First push establishes the snapshot with A and B.
    let server1 = MockServer::start().await;
    mock_ref(&server1, "head1").await;
    mock_commit(&server1, "head1", "tree1").await;
    mock_push_writes(&server1, "tree2", "commit2").await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let both = vec![leaf("l1", "n1", "A", "alpha"), leaf("l2", "n1", "B", "beta")];
    let empty = SyncSnapshot::default();

    let first = SyncCoordinator::with_base_url(server1.uri())
        .execute_push(push_request(&both, &notes, &settings, &empty))
        .await;
    let snapshot = first.snapshot.unwrap();

    // Second push: B is gone from the desired state.
    let server2 = MockServer::start().await;
    mock_ref(&server2, "commit2").await;
    mock_commit(&server2, "commit2", "tree2").await;
    mock_push_writes(&server2, "tree3", "commit3").await;

    let only_a = vec![leaf("l1", "n1", "A", "alpha")];
    let second = SyncCoordinator::with_base_url(server2.uri())
        .execute_push(push_request(&only_a, &notes, &settings, &snapshot))
        .await;

    assert!(second.success);
    // B's removal counts as a content change.
    assert_eq!(second.changed_leaf_count, Some(1));

    let tree_requests = requests_to(&server2, "/git/trees").await;
    let paths = tree_paths(&tree_requests[0]);
    assert!(paths.contains(&"notes/Work/A.md".to_string()));
    assert!(!paths.contains(&"notes/Work/B.md".to_string()));
}

#[tokio::test]
async fn renaming_a_note_moves_all_leaf_paths_in_one_commit() {
    let server1 = MockServer::start().await;
    mock_ref(&server1, "head1").await;
    mock_commit(&server1, "head1", "tree1").await;
    mock_push_writes(&server1, "tree2", "commit2").await;

    let settings = settings();
    let leaves = vec![leaf("l1", "n1", "A", "alpha"), leaf("l2", "n1", "B", "beta")];
    let empty = SyncSnapshot::default();

    let before = vec![note("n1", "Work")];
    let first = SyncCoordinator::with_base_url(server1.uri())
        .execute_push(push_request(&leaves, &before, &settings, &empty))
        .await;
    let snapshot = first.snapshot.unwrap();

    let server2 = MockServer::start().await;
    mock_ref(&server2, "commit2").await;
    mock_commit(&server2, "commit2", "tree2").await;
    mock_push_writes(&server2, "tree3", "commit3").await;

    let after = vec![note("n1", "Life")];
    let second = SyncCoordinator::with_base_url(server2.uri())
        .execute_push(push_request(&leaves, &after, &settings, &snapshot))
        .await;

    assert!(second.success);
    // Contents untouched; only paths and metadata moved.
    assert_eq!(second.changed_leaf_count, Some(0));
    assert_eq!(second.metadata_only_changed, Some(true));

    let tree_requests = requests_to(&server2, "/git/trees").await;
    let mut paths = tree_paths(&tree_requests[0]);
    paths.sort();
    assert_eq!(
        paths,
        vec!["notes/Life/A.md", "notes/Life/B.md", "notes/metadata.json"]
    );
}

#[tokio::test]
async fn reorder_only_push_reports_metadata_only_change() {
    let server1 = MockServer::start().await;
    mock_ref(&server1, "head1").await;
    mock_commit(&server1, "head1", "tree1").await;
    mock_push_writes(&server1, "tree2", "commit2").await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let mut leaves = vec![leaf("l1", "n1", "A", "alpha"), leaf("l2", "n1", "B", "beta")];
    leaves[0].order = 0;
    leaves[1].order = 1;
    let empty = SyncSnapshot::default();

    let first = SyncCoordinator::with_base_url(server1.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &empty))
        .await;
    let snapshot = first.snapshot.unwrap();

    let server2 = MockServer::start().await;
    mock_ref(&server2, "commit2").await;
    mock_commit(&server2, "commit2", "tree2").await;
    mock_push_writes(&server2, "tree3", "commit3").await;

    leaves[0].order = 1;
    leaves[1].order = 0;
    let second = SyncCoordinator::with_base_url(server2.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &snapshot))
        .await;

    assert!(second.success);
    assert_eq!(second.changed_leaf_count, Some(0));
    assert_eq!(second.metadata_only_changed, Some(true));
}

#[tokio::test]
async fn push_to_empty_repository_creates_parentless_initial_commit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Git Repository is empty.",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/commits")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "commit1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/refs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ref": "refs/heads/main" })))
        .mount(&server)
        .await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let leaves = vec![leaf("l1", "n1", "A", "alpha")];
    let previous = SyncSnapshot::default();

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &previous))
        .await;

    assert!(result.success, "push failed: {}", result.message);
    assert_eq!(result.commit_sha.as_deref(), Some("commit1"));

    let commit_requests = requests_to(&server, "/git/commits").await;
    let body: Value = serde_json::from_slice(&commit_requests[0].body).unwrap();
    assert_eq!(body["parents"], json!([]));

    // The branch ref was created, not fast-forwarded.
    assert_eq!(requests_to(&server, "/git/refs").await.len(), 1);
}

#[tokio::test]
async fn unchanged_tree_skips_commit_and_ref_update() {
    let server = MockServer::start().await;
    mock_ref(&server, "head1").await;
    mock_commit(&server, "head1", "tree1").await;
    // The rebuilt tree hashes to the same SHA as the base tree.
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree1" })))
        .mount(&server)
        .await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let leaves = vec![leaf("l1", "n1", "A", "alpha")];
    let previous = SyncSnapshot::default();

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &previous))
        .await;

    assert!(result.success);
    assert_eq!(result.commit_sha.as_deref(), Some("head1"));
    assert!(requests_to(&server, "/git/commits").await.is_empty());
}

#[tokio::test]
async fn concurrent_ref_move_surfaces_as_conflict() {
    let server = MockServer::start().await;
    mock_ref(&server, "head1").await;
    mock_commit(&server, "head1", "tree1").await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree2" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/commits")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "commit2" })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{REPO}/git/refs/heads/main")))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Update is not a fast forward",
        })))
        .mount(&server)
        .await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let leaves = vec![leaf("l1", "n1", "A", "alpha")];
    let previous = SyncSnapshot::default();

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &previous))
        .await;

    assert!(!result.success);
    assert_eq!(result.message, "toast.pushConflict");
    assert!(result.commit_sha.is_none());
}

#[tokio::test]
async fn auth_failure_is_distinct_and_carries_rate_limit_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("x-ratelimit-remaining", "59")
                .insert_header("x-ratelimit-limit", "60")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_json(json!({ "message": "Bad credentials" })),
        )
        .mount(&server)
        .await;

    let settings = settings();
    let notes = vec![note("n1", "Work")];
    let leaves = vec![leaf("l1", "n1", "A", "alpha")];
    let previous = SyncSnapshot::default();

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_push(push_request(&leaves, &notes, &settings, &previous))
        .await;

    assert!(!result.success);
    assert_eq!(result.message, "toast.authError");
    let rate = result.rate_limit_info.expect("rate limit surfaced on failure");
    assert_eq!(rate.remaining, 59);
    assert_eq!(rate.limit, 60);
}

async fn mount_pull_fixture(server: &MockServer, metadata_json: Value) {
    mock_ref(server, "head1").await;
    mock_commit(server, "head1", "tree1").await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/trees/tree1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "tree1",
            "truncated": false,
            "tree": [
                { "path": "notes", "type": "tree", "sha": "d1" },
                { "path": "notes/Work", "type": "tree", "sha": "d2" },
                { "path": "notes/Work/A.md", "type": "blob", "sha": "blob-a" },
                { "path": "notes/Work/B.md", "type": "blob", "sha": "blob-b" },
                { "path": "notes/metadata.json", "type": "blob", "sha": "blob-meta" },
            ],
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-a")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body("alpha")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-b")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body("beta")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-meta")))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_json))
        .mount(server)
        .await;
}

fn metadata_fixture() -> Value {
    let metadata = json!({
        "archiveLoaded": false,
        "notes": [
            { "id": "n1", "name": "Work", "order": 0 },
        ],
        "leaves": [
            { "id": "l1", "path": "notes/Work/A.md", "order": 0, "updatedAt": 111 },
            { "id": "l2", "path": "notes/Work/B.md", "order": 1, "updatedAt": 222 },
        ],
    });
    blob_body(&metadata.to_string())
}

#[tokio::test]
async fn pull_assembles_notes_and_leaves_from_manifest_and_metadata() {
    let server = MockServer::start().await;
    mount_pull_fixture(&server, metadata_fixture()).await;

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings(), &PullOptions::default())
        .await;

    assert!(result.success, "pull failed: {}", result.message);
    assert_eq!(result.commit_sha.as_deref(), Some("head1"));

    assert_eq!(result.notes.len(), 1);
    assert_eq!(result.notes[0].id, "n1");
    assert_eq!(result.notes[0].name, "Work");

    assert_eq!(result.leaves.len(), 2);
    let a = result.leaves.iter().find(|l| l.id == "l1").unwrap();
    assert_eq!(a.title, "A");
    assert_eq!(a.content, "alpha");
    assert_eq!(a.note_id, "n1");
    assert_eq!(a.updated_at, 111);
}

#[tokio::test]
async fn pull_reports_priority_leaf_before_the_rest() {
    let server = MockServer::start().await;
    mount_pull_fixture(&server, metadata_fixture()).await;

    let progress: Arc<Mutex<Vec<PullProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let options = PullOptions {
        priority: Some(PullPriority {
            leaf_paths: vec!["notes/Work/A.md".to_string()],
            note_ids: vec![],
        }),
        on_progress: Some(Arc::new(move |p| sink.lock().unwrap().push(p))),
    };

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings(), &options)
        .await;
    assert!(result.success);

    // Monotonic counter: 1 of 2, then 2 of 2.
    let reported = progress.lock().unwrap().clone();
    assert_eq!(
        reported,
        vec![
            PullProgress { fetched: 1, total: 2 },
            PullProgress { fetched: 2, total: 2 },
        ]
    );

    // The priority blob was requested strictly before the rest partition
    // started. (The metadata blob is fetched up front and is not a leaf.)
    let leaf_requests: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .filter(|p| p.ends_with("blob-a") || p.ends_with("blob-b"))
        .collect();
    assert_eq!(leaf_requests.len(), 2);
    assert!(leaf_requests[0].ends_with("blob-a"));

    // Final collection is complete regardless of completion order.
    assert_eq!(result.leaves.len(), 2);
}

#[tokio::test]
async fn pull_of_empty_repository_is_a_success_with_empty_collections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Git Repository is empty.",
        })))
        .mount(&server)
        .await;

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings(), &PullOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.message, "toast.emptyRepository");
    assert!(result.notes.is_empty());
    assert!(result.leaves.is_empty());
    assert!(result.commit_sha.is_none());
}

#[tokio::test]
async fn pull_falls_back_to_derived_records_on_corrupt_metadata() {
    let server = MockServer::start().await;
    mount_pull_fixture(&server, blob_body("{ not json")).await;

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings(), &PullOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.leaves.len(), 2);
    // Ids are derived from paths when metadata is unusable.
    assert!(result.leaves.iter().any(|l| l.id == "leaf:notes/Work/A"));
    assert_eq!(result.notes.len(), 1);
    assert_eq!(result.notes[0].id, "note:notes/Work");
}

#[tokio::test]
async fn noop_push_right_after_archive_pull_reports_no_changes() {
    let server = MockServer::start().await;
    mock_ref(&server, "head1").await;
    mock_commit(&server, "head1", "tree1").await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/trees/tree1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "tree1",
            "truncated": false,
            "tree": [
                { "path": "notes/Work/A.md", "type": "blob", "sha": "blob-a" },
                { "path": "notes/metadata.json", "type": "blob", "sha": "blob-meta" },
                { "path": "archive/Old/B.md", "type": "blob", "sha": "blob-old" },
                { "path": "archive/metadata.json", "type": "blob", "sha": "blob-ameta" },
            ],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-a")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body("alpha")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-old")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body("past")))
        .mount(&server)
        .await;
    let home_meta = json!({
        "archiveLoaded": true,
        "notes": [{ "id": "n1", "name": "Work", "order": 0 }],
        "leaves": [{ "id": "l1", "path": "notes/Work/A.md", "order": 0, "updatedAt": 1 }],
    });
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-meta")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body(&home_meta.to_string())))
        .mount(&server)
        .await;
    let archive_meta = json!({
        "notes": [{ "id": "a1", "name": "Old", "order": 0 }],
        "leaves": [{ "id": "l2", "path": "archive/Old/B.md", "order": 0, "updatedAt": 2 }],
    });
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-ameta")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(blob_body(&archive_meta.to_string())),
        )
        .mount(&server)
        .await;

    let settings = settings();
    let pulled = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings, &PullOptions::default())
        .await;
    assert!(pulled.success, "pull failed: {}", pulled.message);
    let snapshot = pulled.snapshot.clone().unwrap();

    // Push the pulled state straight back, split by world the way a
    // client does. The rebuilt tree hashes to the same SHA.
    let push_server = MockServer::start().await;
    mock_ref(&push_server, "head1").await;
    mock_commit(&push_server, "head1", "tree1").await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree1" })))
        .mount(&push_server)
        .await;

    let archive_notes: Vec<Note> = pulled
        .notes
        .iter()
        .filter(|n| n.world == World::Archive)
        .cloned()
        .collect();
    let home_notes: Vec<Note> = pulled
        .notes
        .iter()
        .filter(|n| n.world != World::Archive)
        .cloned()
        .collect();
    let (archive_leaves, home_leaves): (Vec<Leaf>, Vec<Leaf>) = pulled
        .leaves
        .iter()
        .cloned()
        .partition(|l| archive_notes.iter().any(|n| n.id == l.note_id));

    let result = SyncCoordinator::with_base_url(push_server.uri())
        .execute_push(PushRequest {
            leaves: &home_leaves,
            notes: &home_notes,
            settings: &settings,
            operations_locked: false,
            local_metadata: Some(&pulled.metadata),
            archive: Some(ArchiveData {
                leaves: &archive_leaves,
                notes: &archive_notes,
                metadata: &pulled.metadata,
            }),
            previous: &snapshot,
        })
        .await;

    assert!(result.success, "push failed: {}", result.message);
    assert_eq!(result.changed_leaf_count, Some(0));
    assert_eq!(result.metadata_only_changed, Some(false));
    assert_eq!(result.commit_sha.as_deref(), Some("head1"));
    assert!(requests_to(&push_server, "/git/commits").await.is_empty());
}

#[tokio::test]
async fn failed_pull_keeps_metadata_read_before_the_failure() {
    let server = MockServer::start().await;
    mock_ref(&server, "head1").await;
    mock_commit(&server, "head1", "tree1").await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/trees/tree1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "tree1",
            "truncated": false,
            "tree": [
                { "path": "notes/Work/A.md", "type": "blob", "sha": "blob-a" },
                { "path": "notes/metadata.json", "type": "blob", "sha": "blob-meta" },
            ],
        })))
        .mount(&server)
        .await;
    let home_meta = json!({
        "badgeIcon": "star",
        "notes": [{ "id": "n1", "name": "Work", "order": 0 }],
        "leaves": [{ "id": "l1", "path": "notes/Work/A.md", "order": 0, "updatedAt": 1 }],
    });
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-meta")))
        .respond_with(ResponseTemplate::new(200).set_body_json(blob_body(&home_meta.to_string())))
        .mount(&server)
        .await;
    // The leaf blob fetch fails after the metadata was already read.
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/blobs/blob-a")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "server error",
        })))
        .mount(&server)
        .await;

    let result = SyncCoordinator::with_base_url(server.uri())
        .execute_pull(&settings(), &PullOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.message, "toast.apiError");
    assert!(result.notes.is_empty());
    assert!(result.leaves.is_empty());
    // Salvaged metadata survives the failure.
    assert_eq!(result.metadata.badge_icon.as_deref(), Some("star"));
    assert_eq!(result.metadata.notes.len(), 1);
    assert_eq!(result.metadata.notes[0].id, "n1");
}

#[tokio::test]
async fn pull_network_failure_returns_empty_collections_with_classification() {
    let settings = Settings {
        token: "t".to_string(),
        // Unroutable host: transport failure, not an API rejection.
        repository: "octo/notes".to_string(),
        ..Settings::default()
    };
    let result = SyncCoordinator::with_base_url("http://127.0.0.1:1")
        .execute_pull(&settings, &PullOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.message, "toast.networkError");
    assert!(result.notes.is_empty());
    assert!(result.leaves.is_empty());
}

#[tokio::test]
async fn stale_check_decision_table_over_the_wire() {
    let settings = settings();

    // Remote moved past the local sha.
    let server = MockServer::start().await;
    mock_ref(&server, "remote-sha").await;
    let coordinator = SyncCoordinator::with_base_url(server.uri());
    assert_eq!(
        coordinator.check_stale_status(&settings, Some("local-sha")).await,
        StaleCheckResult::Stale {
            remote_commit_sha: "remote-sha".to_string(),
            local_commit_sha: "local-sha".to_string(),
        }
    );

    // Same sha, and the never-synced case.
    assert_eq!(
        coordinator.check_stale_status(&settings, Some("remote-sha")).await,
        StaleCheckResult::UpToDate
    );
    assert_eq!(
        coordinator.check_stale_status(&settings, None).await,
        StaleCheckResult::UpToDate
    );

    // Empty repository.
    let empty = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Git Repository is empty.",
        })))
        .mount(&empty)
        .await;
    assert_eq!(
        SyncCoordinator::with_base_url(empty.uri())
            .check_stale_status(&settings, Some("anything"))
            .await,
        StaleCheckResult::UpToDate
    );

    // Auth failure carries its classification.
    let denied = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Bad credentials",
        })))
        .mount(&denied)
        .await;
    assert_eq!(
        SyncCoordinator::with_base_url(denied.uri())
            .check_stale_status(&settings, Some("anything"))
            .await,
        StaleCheckResult::CheckFailed {
            reason: HeadLookup::AuthError("Bad credentials".to_string()),
        }
    );
}

#[tokio::test]
async fn legacy_content_lookup_returns_sha_or_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/contents/notes/Work/A.md")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "blob-a",
            "path": "notes/Work/A.md",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/contents/notes/Work/missing.md")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
        })))
        .mount(&server)
        .await;

    let client = GitHubClient::new(&settings())
        .unwrap()
        .with_base_url(server.uri());
    assert_eq!(
        client.get_content_sha("notes/Work/A.md").await.unwrap(),
        Some("blob-a".to_string())
    );
    assert_eq!(
        client.get_content_sha("notes/Work/missing.md").await.unwrap(),
        None
    );
}
