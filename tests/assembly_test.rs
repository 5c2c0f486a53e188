use content_stager::assembler::{Assembler, AssemblerConfig};
use content_stager::db::SqliteStore;
use content_stager::model::Batch;
use std::collections::HashSet;

async fn setup_store() -> SqliteStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteStore::new(pool, "https://stage.example.com/uploads")
}

async fn insert_post(store: &SqliteStore, id: i64, post_type: &str, parent: i64, author: i64) {
    sqlx::query(
        "INSERT INTO posts (id, guid, post_type, post_parent, post_author, post_title) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("https://stage.example.com/?p={id}"))
    .bind(post_type)
    .bind(parent)
    .bind(author)
    .bind(format!("Post {id}"))
    .execute(store.pool())
    .await
    .unwrap();
}

async fn insert_meta(store: &SqliteStore, post_id: i64, key: &str, value: &str) {
    sqlx::query("INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?, ?, ?)")
        .bind(post_id)
        .bind(key)
        .bind(value)
        .execute(store.pool())
        .await
        .unwrap();
}

async fn insert_user(store: &SqliteStore, id: i64, login: &str) {
    sqlx::query("INSERT INTO users (id, user_login, display_name) VALUES (?, ?, ?)")
        .bind(id)
        .bind(login)
        .bind(login)
        .execute(store.pool())
        .await
        .unwrap();
}

async fn insert_category(store: &SqliteStore, tt_id: i64, term_id: i64, parent_term: i64) {
    sqlx::query("INSERT INTO terms (term_id, name, slug) VALUES (?, ?, ?)")
        .bind(term_id)
        .bind(format!("Term {term_id}"))
        .bind(format!("term-{term_id}"))
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO term_taxonomy (term_taxonomy_id, term_id, taxonomy, parent) VALUES (?, ?, 'category', ?)",
    )
    .bind(tt_id)
    .bind(term_id)
    .bind(parent_term)
    .execute(store.pool())
    .await
    .unwrap();
}

async fn relate(store: &SqliteStore, post_id: i64, tt_id: i64, order: i64) {
    sqlx::query(
        "INSERT INTO term_relationships (object_id, term_taxonomy_id, term_order) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(tt_id)
    .bind(order)
    .execute(store.pool())
    .await
    .unwrap();
}

fn thumbnail_config() -> AssemblerConfig {
    AssemblerConfig::default().with_relation_keys(["_thumbnail_id"])
}

fn ids(batch: &Batch) -> Vec<i64> {
    batch.posts.iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn thumbnail_relation_pulls_in_related_post_once() {
    let store = setup_store().await;
    insert_post(&store, 10, "post", 0, 1).await;
    insert_post(&store, 11, "attachment", 10, 1).await;
    insert_meta(&store, 10, "_thumbnail_id", "11").await;
    // 11 points back at 10; must not expand again.
    insert_meta(&store, 11, "_thumbnail_id", "10").await;

    let assembler = Assembler::new(&store, &store, thumbnail_config());
    let batch = assembler.assemble(&[10]).await.unwrap();

    assert_eq!(ids(&batch), vec![10, 11]);
    let p11 = &batch.posts[1];
    assert_eq!(p11.parent_guid.as_deref(), Some("https://stage.example.com/?p=10"));
    assert_eq!(batch.posts[0].meta.len(), 1);
    assert_eq!(p11.meta.len(), 1);
}

#[tokio::test]
async fn related_post_cycle_terminates() {
    let store = setup_store().await;
    insert_post(&store, 1, "post", 0, 1).await;
    insert_post(&store, 2, "post", 0, 1).await;
    insert_meta(&store, 1, "related", "2").await;
    insert_meta(&store, 2, "related", "1").await;

    let config = AssemblerConfig::default().with_relation_keys(["related"]);
    let assembler = Assembler::new(&store, &store, config);
    let batch = assembler.assemble(&[1, 2, 1]).await.unwrap();

    assert_eq!(ids(&batch), vec![1, 2]);
}

#[tokio::test]
async fn unlisted_meta_keys_do_not_pull_posts() {
    let store = setup_store().await;
    insert_post(&store, 10, "post", 0, 1).await;
    insert_post(&store, 11, "post", 0, 1).await;
    insert_meta(&store, 10, "_thumbnail_id", "11").await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[10]).await.unwrap();
    assert_eq!(ids(&batch), vec![10]);
}

#[tokio::test]
async fn stale_references_are_skipped() {
    let store = setup_store().await;
    insert_post(&store, 10, "post", 99, 1).await;
    insert_meta(&store, 10, "_thumbnail_id", "404").await;
    insert_meta(&store, 10, "_thumbnail_id", "not-a-number").await;

    let assembler = Assembler::new(&store, &store, thumbnail_config());
    let batch = assembler.assemble(&[10, 500]).await.unwrap();

    assert_eq!(ids(&batch), vec![10]);
    assert_eq!(batch.posts[0].parent, 99);
    assert_eq!(batch.posts[0].parent_guid, None);
}

#[tokio::test]
async fn parent_guid_matches_parent_when_both_included() {
    let store = setup_store().await;
    insert_post(&store, 1, "page", 0, 1).await;
    insert_post(&store, 2, "page", 1, 1).await;
    insert_post(&store, 3, "page", 2, 1).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[3, 2, 1]).await.unwrap();

    for post in &batch.posts {
        if let Some(parent) = batch.posts.iter().find(|p| p.id == post.parent) {
            assert_eq!(post.parent_guid.as_deref(), Some(parent.guid.as_str()));
        }
    }
    assert_eq!(batch.posts.iter().find(|p| p.id == 1).unwrap().parent_guid, None);
}

#[tokio::test]
async fn root_filter_runs_before_resolution() {
    let store = setup_store().await;
    insert_post(&store, 1, "post", 0, 1).await;
    insert_post(&store, 2, "post", 0, 1).await;

    let config = AssemblerConfig::default().with_root_filter(|mut ids| {
        ids.retain(|id| *id != 1);
        ids.push(2);
        ids
    });
    let assembler = Assembler::new(&store, &store, config);
    let batch = assembler.assemble(&[1]).await.unwrap();
    assert_eq!(ids(&batch), vec![2]);
}

#[tokio::test]
async fn users_are_distinct_authors() {
    let store = setup_store().await;
    insert_user(&store, 1, "alice").await;
    insert_user(&store, 2, "bob").await;
    insert_user(&store, 3, "carol").await;
    insert_post(&store, 10, "post", 0, 2).await;
    insert_post(&store, 11, "post", 0, 1).await;
    insert_post(&store, 12, "post", 0, 2).await;
    insert_post(&store, 13, "post", 0, 77).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[10, 11, 12, 13]).await.unwrap();

    let logins: Vec<&str> = batch.users.iter().map(|u| u.login.as_str()).collect();
    assert_eq!(logins, vec!["alice", "bob"]);
}

#[tokio::test]
async fn attachments_get_descriptors() {
    let store = setup_store().await;
    insert_post(&store, 20, "attachment", 0, 1).await;
    insert_meta(
        &store,
        20,
        "_wp_attachment_metadata",
        r#"{"file":"2014/05/cat.jpg","sizes":{"thumbnail":{"file":"cat-150x150.jpg"},"large":{"file":"cat-1024x768.jpg"}}}"#,
    )
    .await;
    insert_post(&store, 21, "attachment", 0, 1).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[20, 21]).await.unwrap();

    assert_eq!(batch.attachments.len(), 1);
    let a = &batch.attachments[0];
    assert_eq!(a.path, "2014/05");
    assert_eq!(
        a.sizes,
        vec![
            "https://stage.example.com/uploads/2014/05/cat.jpg",
            "https://stage.example.com/uploads/2014/05/cat-1024x768.jpg",
            "https://stage.example.com/uploads/2014/05/cat-150x150.jpg",
        ]
    );
}

#[tokio::test]
async fn taxonomy_closure_contains_every_ancestor_once() {
    let store = setup_store().await;
    // term 1 (root) <- term 2 <- term 3, and term 4 also under term 2.
    insert_category(&store, 101, 1, 0).await;
    insert_category(&store, 102, 2, 1).await;
    insert_category(&store, 103, 3, 2).await;
    insert_category(&store, 104, 4, 2).await;
    insert_category(&store, 105, 5, 0).await;

    insert_post(&store, 10, "post", 0, 1).await;
    insert_post(&store, 11, "post", 0, 1).await;
    relate(&store, 10, 103, 0).await;
    relate(&store, 11, 104, 1).await;
    relate(&store, 11, 102, 0).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[10, 11]).await.unwrap();

    let tt_ids: HashSet<i64> = batch.term_taxonomies.iter().map(|tt| tt.id).collect();
    assert_eq!(tt_ids, HashSet::from([101, 102, 103, 104]));
    assert_eq!(batch.term_taxonomies.len(), 4);

    // Closure: every non-root parent is present.
    let term_ids: HashSet<i64> = batch.term_taxonomies.iter().map(|tt| tt.term_id).collect();
    for tt in &batch.term_taxonomies {
        if tt.parent > 0 {
            assert!(term_ids.contains(&tt.parent), "missing ancestor of {}", tt.id);
        }
    }

    // Dedup: no two entries equal by value.
    for (i, a) in batch.term_taxonomies.iter().enumerate() {
        for b in &batch.term_taxonomies[i + 1..] {
            assert_ne!(a, b);
        }
    }

    let terms: HashSet<i64> = batch.terms.iter().map(|t| t.id).collect();
    assert_eq!(terms, HashSet::from([1, 2, 3, 4]));

    let p10 = batch.posts.iter().find(|p| p.id == 10).unwrap();
    assert_eq!(p10.taxonomies.len(), 1);
    assert_eq!(p10.taxonomies[0].term_taxonomy_id, 103);
    let p11 = batch.posts.iter().find(|p| p.id == 11).unwrap();
    let p11_tts: Vec<(i64, i64)> = p11
        .taxonomies
        .iter()
        .map(|r| (r.term_taxonomy_id, r.order))
        .collect();
    assert_eq!(p11_tts, vec![(102, 0), (104, 1)]);
}

#[tokio::test]
async fn ancestor_climb_stops_at_missing_parent() {
    let store = setup_store().await;
    insert_category(&store, 201, 7, 6).await;
    insert_post(&store, 10, "post", 0, 1).await;
    relate(&store, 10, 201, 0).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let batch = assembler.assemble(&[10]).await.unwrap();

    assert_eq!(batch.term_taxonomies.len(), 1);
    // Parent term 6 has no row; only term 7 comes back.
    let terms: Vec<i64> = batch.terms.iter().map(|t| t.id).collect();
    assert_eq!(terms, vec![7]);
}

#[tokio::test]
async fn populate_keeps_batch_identity() {
    let store = setup_store().await;
    insert_post(&store, 1, "post", 0, 1).await;

    let assembler = Assembler::new(&store, &store, AssemblerConfig::default());
    let mut batch = Batch::new("Launch", 4);
    let guid = batch.guid.clone();
    assembler.populate(&mut batch, &[1]).await.unwrap();

    assert_eq!(batch.guid, guid);
    assert_eq!(batch.title, "Launch");
    assert_eq!(ids(&batch), vec![1]);
}
