use async_trait::async_trait;
use content_stager::assembler::{Assembler, AssemblerConfig};
use content_stager::db::SqliteStore;
use content_stager::dispatch::{Action, Receiver};
use content_stager::envelope;
use content_stager::import_job::{ImportLauncher, LaunchOutcome};
use content_stager::preflight::AssetProbe;
use content_stager::reconciler::Reconciler;
use content_stager::staging;
use content_stager::store::BatchStore;
use std::sync::{Arc, Mutex};

async fn setup_store(uploads: &str) -> SqliteStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteStore::new(pool, uploads)
}

async fn insert_post(store: &SqliteStore, id: i64, guid: &str, parent: i64) {
    sqlx::query("INSERT INTO posts (id, guid, post_parent, post_author) VALUES (?, ?, ?, 1)")
        .bind(id)
        .bind(guid)
        .bind(parent)
        .execute(store.pool())
        .await
        .unwrap();
}

struct AlwaysThere;

#[async_trait]
impl AssetProbe for AlwaysThere {
    async fn exists(&self, _url: &str) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingLauncher {
    launched: Mutex<Vec<i64>>,
}

impl ImportLauncher for RecordingLauncher {
    fn launch(&self, batch_id: i64) -> LaunchOutcome {
        self.launched.lock().unwrap().push(batch_id);
        LaunchOutcome::Started { pid: None }
    }
}

#[tokio::test]
async fn create_edit_and_load_lazily() {
    let stage = setup_store("https://stage.example.com/uploads").await;
    insert_post(&stage, 1, "g1", 0).await;
    insert_post(&stage, 2, "g2", 0).await;

    let record = staging::create_batch(&stage, "Draft", 9, &[1]).await.unwrap();
    assert_eq!(record.content, "[1]");
    assert!(!record.guid.is_empty());

    let edited = staging::edit_batch(&stage, record.id, Some("Final"), Some(&[1, 2][..]))
        .await
        .unwrap();
    assert_eq!(edited.guid, record.guid);

    let assembler = Assembler::new(&stage, &stage, AssemblerConfig::default());
    let lazy = staging::load_batch(&stage, &assembler, record.id, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lazy.id, Some(record.id));
    assert_eq!(lazy.title, "Final");
    assert!(lazy.posts.is_empty());

    let full = staging::load_batch(&stage, &assembler, record.id, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(full.post_ids(), vec![1, 2]);

    assert!(staging::load_batch(&stage, &assembler, 999, false)
        .await
        .unwrap()
        .is_none());
    assert!(staging::edit_batch(&stage, 999, None, None).await.is_err());
}

#[tokio::test]
async fn staged_batch_lands_on_production_by_guid() {
    let stage = setup_store("https://stage.example.com/uploads").await;
    insert_post(&stage, 10, "https://stage.example.com/?p=10", 0).await;
    insert_post(&stage, 11, "https://stage.example.com/?p=11", 10).await;
    let record = staging::create_batch(&stage, "Launch", 1, &[11]).await.unwrap();

    // Production already has the parent, under a different local ID.
    let prod = Arc::new(setup_store("https://www.example.com/uploads").await);
    insert_post(&prod, 500, "https://stage.example.com/?p=10", 0).await;
    // A stray row occupying the sender's local ID must not collide.
    insert_post(&prod, 1, "https://www.example.com/?p=1", 0).await;

    let assembler = Assembler::new(&stage, &stage, AssemblerConfig::default());
    let batch = staging::load_batch(&stage, &assembler, record.id, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        batch.posts[0].parent_guid.as_deref(),
        Some("https://stage.example.com/?p=10")
    );

    let launcher = Arc::new(RecordingLauncher::default());
    let reconciler = Reconciler::new(prod.clone(), launcher.clone());
    let rx = Receiver::new("www.example.com", prod.clone(), Arc::new(AlwaysThere), 4, reconciler);

    let preflight = staging::build_request(Action::Preflight, &batch).unwrap();
    let res = rx.handle(&preflight).await;
    assert_eq!(res.success, vec!["Pre-flight successful!"], "{res:?}");

    let send = staging::build_request(Action::Send, &batch).unwrap();
    let first = rx.handle(&send).await;
    let again = rx.handle(&send).await;
    assert_eq!(first.info, again.info);

    let stored = prod.get_batch_by_guid(&record.guid).await.unwrap().unwrap();
    assert_eq!(stored.title, "Launch");
    assert_eq!(envelope::decode(&stored.content).unwrap().post_ids(), vec![11]);
    assert_eq!(prod.count_batches().await.unwrap(), 1);
    assert_eq!(*launcher.launched.lock().unwrap(), vec![stored.id, stored.id]);
}
