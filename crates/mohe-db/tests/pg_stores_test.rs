//! Integration tests for the PostgreSQL vector, bookmark, top-K and cache stores.
//!
//! This test validates:
//! - Description vector upsert bumps the stored version
//! - pgvector round trip keeps 100 dimensions
//! - Top-K replacement swaps the whole list in one transaction
//! - Concurrent top-K replacements of one place all succeed
//! - Co-bookmarked place lookup
//! - Bookmarks carry the user's MBTI and creation time
//! - Similarity cache put/get/invalidate
//!
//! Requires a migrated database at `DATABASE_URL`. Run with
//! `cargo test -p mohe-db -- --ignored`.

use chrono::Utc;
use futures::future::join_all;

use mohe_db::test_fixtures::{unique_id_base, TestDatabase};
use mohe_db::{
    BookmarkGraph, CachedSimilarity, DescriptionVector, PreferenceVector, SelectedKeyword,
    SimilarityCache, SimilarityResult, TopKEntry, TopKStore, VectorStore,
};

fn entry(place_id: i64, neighbor: i64, rank: i32, score: f64) -> TopKEntry {
    TopKEntry {
        place_id,
        neighbor_place_id: neighbor,
        rank,
        jaccard: score,
        cosine_bin: 0.0,
        description_cosine_bin: 0.0,
        co_occurrence_count: 1,
        score,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_description_vector_upsert_versions() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let vectors = &test_db.db.vectors;

    let keywords = vec![SelectedKeyword::new(16, "quiet", 0.8)];
    let v = DescriptionVector::new(base, vec![0.25; 100], keywords, "kw-extractor", None);
    assert_eq!(vectors.upsert_description_vector(&v).await.unwrap(), 1);
    assert_eq!(vectors.upsert_description_vector(&v).await.unwrap(), 2);

    let stored = vectors.get_description_vector(base).await.unwrap().unwrap();
    assert_eq!(stored.vector.len(), 100);
    assert_eq!(stored.selected_keywords.len(), 1);
    assert_eq!(stored.version, 2);
    assert_eq!(
        vectors
            .described_place_ids_in_range(base, base + 1)
            .await
            .unwrap(),
        vec![base]
    );

    test_db.cleanup_ids(base).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_topk_replace_swaps_list() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let topk = &test_db.db.topk;

    topk.replace_for_place(
        base,
        &[entry(base, base + 1, 1, 0.9), entry(base, base + 2, 2, 0.5)],
    )
    .await
    .unwrap();
    topk.replace_for_place(base, &[entry(base, base + 3, 1, 0.7)])
        .await
        .unwrap();

    let list = topk.get_for_place(base).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].neighbor_place_id, base + 3);
    assert_eq!(list[0].rank, 1);

    test_db.cleanup_ids(base).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_topk_replacements_serialise() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let topk = &test_db.db.topk;

    let lists: Vec<Vec<TopKEntry>> = (0..8)
        .map(|writer| {
            let score = 0.1 * (writer + 1) as f64;
            (1..=3)
                .map(|rank| entry(base, base + 10 * rank as i64 + writer, rank, score))
                .collect()
        })
        .collect();
    let results = join_all(lists.iter().map(|list| topk.replace_for_place(base, list))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    // Exactly one writer's list survives.
    let list = topk.get_for_place(base).await.unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(list.iter().all(|e| (e.score - list[0].score).abs() < 1e-9));

    test_db.cleanup_ids(base).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_co_bookmarked_places() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let bookmarks = &test_db.db.bookmarks;

    bookmarks.add(base, base + 1).await.unwrap();
    bookmarks.add(base, base + 2).await.unwrap();
    bookmarks.add(base + 1, base + 3).await.unwrap();

    let co = bookmarks.co_bookmarked_places(base + 1).await.unwrap();
    assert_eq!(co, vec![base + 2]);

    test_db.cleanup_ids(base).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_bookmarks_carry_mbti() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let bookmarks = &test_db.db.bookmarks;

    bookmarks.add(base, base + 1).await.unwrap();
    bookmarks.add(base + 1, base + 1).await.unwrap();
    bookmarks.add(base, base + 2).await.unwrap();
    bookmarks.set_user_mbti(base, "INFP").await.unwrap();

    let by_place = bookmarks
        .bookmarks_for_places(&[base + 1, base + 5])
        .await
        .unwrap();
    assert!(by_place[&(base + 5)].is_empty());
    let first = &by_place[&(base + 1)];
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].user_id, base);
    assert_eq!(first[0].user_mbti.as_deref(), Some("INFP"));
    assert!(!first[1].has_mbti());

    assert_eq!(
        bookmarks.places_for_user(base).await.unwrap(),
        vec![base + 1, base + 2]
    );

    test_db.cleanup_ids(base).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_similarity_cache_round_trip() {
    let test_db = TestDatabase::new().await;
    let base = unique_id_base();
    let cache = &test_db.db.similarity_cache;

    let user = PreferenceVector::new(base, vec![0.1; 100], vec![], "m", None);
    let place = DescriptionVector::new(base + 1, vec![0.1; 100], vec![], "m", None);
    let result = SimilarityResult {
        cosine: 1.0,
        jaccard: 1.0,
        euclidean: 0.0,
        trait_boost_factor: 1.0,
        weighted_similarity: 1.0,
        common_keyword_count: 0,
        keyword_overlap_ratio: Some(0.0),
    };
    cache
        .put(&CachedSimilarity::new(&user, &place, Some("INTJ"), result))
        .await
        .unwrap();

    let cached = cache.get(base, base + 1).await.unwrap().unwrap();
    assert_eq!(cached.result.keyword_overlap_ratio, Some(0.0));
    assert_eq!(cached.trait_tag.as_deref(), Some("INTJ"));
    assert_eq!(cached.user_vector_version, user.version);
    assert_eq!(cache.invalidate_place(base + 1).await.unwrap(), 1);
    assert!(cache.get(base, base + 1).await.unwrap().is_none());

    test_db.cleanup_ids(base).await;
}
