mod common;

use common::{draft, register_user, tagged_draft, ObservedStore};
use conduit::article::{self, ArticleUpdate};
use conduit::cache::MemoryCache;
use conduit::tags;

#[test]
fn list_tags_reads_through_the_cache() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();
    let author = register_user(&store, "testuser");
    article::create_article(&store, &cache, &author, tagged_draft("One", &["rust"])).unwrap();

    let first = tags::list_tags(&store, &cache).unwrap();
    assert_eq!(first, vec!["rust".to_string()]);
    assert_eq!(store.tag_query_count(), 1);

    // Second call is served from the cache.
    let second = tags::list_tags(&store, &cache).unwrap();
    assert_eq!(second, first);
    assert_eq!(store.tag_query_count(), 1);
}

#[test]
fn empty_tag_list_is_cached_like_any_other_value() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();

    assert!(tags::list_tags(&store, &cache).unwrap().is_empty());
    assert!(tags::list_tags(&store, &cache).unwrap().is_empty());
    assert_eq!(store.tag_query_count(), 1);
}

#[test]
fn creating_an_article_with_a_new_tag_invalidates_the_cache() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();
    let author = register_user(&store, "testuser");
    article::create_article(&store, &cache, &author, tagged_draft("One", &["rust"])).unwrap();

    assert_eq!(tags::list_tags(&store, &cache).unwrap(), vec!["rust".to_string()]);
    assert_eq!(store.tag_query_count(), 1);

    article::create_article(&store, &cache, &author, tagged_draft("Two", &["testing"])).unwrap();

    // The next read misses and sees the new tag immediately.
    let listed = tags::list_tags(&store, &cache).unwrap();
    assert_eq!(listed, vec!["rust".to_string(), "testing".to_string()]);
    assert_eq!(store.tag_query_count(), 2);
}

#[test]
fn replacing_tags_on_update_invalidates_the_cache() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();
    let author = register_user(&store, "testuser");
    article::create_article(&store, &cache, &author, tagged_draft("One", &["rust"])).unwrap();

    tags::list_tags(&store, &cache).unwrap();
    assert_eq!(store.tag_query_count(), 1);

    article::update_article(
        &store,
        &cache,
        &author,
        "one",
        ArticleUpdate {
            tag_list: Some(vec!["diesel".to_string()]),
            ..ArticleUpdate::default()
        },
    )
    .unwrap();

    let listed = tags::list_tags(&store, &cache).unwrap();
    assert_eq!(listed, vec!["rust".to_string(), "diesel".to_string()]);
    assert_eq!(store.tag_query_count(), 2);
}

#[test]
fn untagged_mutations_leave_the_cache_alone() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();
    let author = register_user(&store, "testuser");
    article::create_article(&store, &cache, &author, tagged_draft("One", &["rust"])).unwrap();

    tags::list_tags(&store, &cache).unwrap();
    assert_eq!(store.tag_query_count(), 1);

    // A create without tags and an update that does not touch the tag set
    // both keep the cached entry.
    article::create_article(&store, &cache, &author, draft("Two")).unwrap();
    article::update_article(
        &store,
        &cache,
        &author,
        "two",
        ArticleUpdate {
            body: Some("Updated body".to_string()),
            ..ArticleUpdate::default()
        },
    )
    .unwrap();

    tags::list_tags(&store, &cache).unwrap();
    assert_eq!(store.tag_query_count(), 1);
}

#[test]
fn tags_are_never_deleted_from_the_listing() {
    let store = ObservedStore::new();
    let cache = MemoryCache::new();
    let author = register_user(&store, "testuser");
    article::create_article(&store, &cache, &author, tagged_draft("One", &["rust"])).unwrap();

    // Dropping the only article using a tag keeps the tag identity alive.
    article::update_article(
        &store,
        &cache,
        &author,
        "one",
        ArticleUpdate {
            tag_list: Some(Vec::new()),
            ..ArticleUpdate::default()
        },
    )
    .unwrap();

    assert_eq!(tags::list_tags(&store, &cache).unwrap(), vec!["rust".to_string()]);
}
