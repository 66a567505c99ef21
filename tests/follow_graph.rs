// tests/follow_graph.rs
mod support;

use std::sync::Arc;
use std::time::Duration;

use follow_feed::cache::{self, keys, CacheStore, MemoryCacheStore};
use follow_feed::follow::{FollowConfig, FollowGraphFetcher};
use follow_feed::model::Creator;
use follow_feed::FeedError;
use support::{creator, Call, FakePlatform, PLATFORM};

const USER: &str = "u1";
const DELAY: Duration = Duration::from_secs(30);

fn fetcher(fake: &Arc<FakePlatform>, store: &Arc<MemoryCacheStore>, cfg: FollowConfig) -> FollowGraphFetcher {
    FollowGraphFetcher::new(fake.clone(), store.clone(), cfg)
}

fn small_pages() -> FollowConfig {
    FollowConfig {
        page_size: 50,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn cache_hit_makes_no_network_call() {
    let fake = FakePlatform::new();
    let store = Arc::new(MemoryCacheStore::new());
    let cached = vec![creator(1), creator(2)];
    cache::set_json(
        store.as_ref(),
        &keys::follow_list(PLATFORM, USER),
        &cached,
        Duration::from_secs(3600),
    )
    .await
    .unwrap();

    let got = fetcher(&fake, &store, small_pages())
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap();
    assert_eq!(got, cached);
    assert!(fake.calls().is_empty(), "no request may be issued on a cache hit");
}

#[tokio::test(start_paused = true)]
async fn pages_until_short_page_and_caches_result() {
    let fake = FakePlatform::new();
    let all: Vec<Creator> = (1..=120).map(creator).collect();
    fake.set_follow_list(&all, 50);
    let store = Arc::new(MemoryCacheStore::new());
    let f = fetcher(&fake, &store, small_pages());

    let started = tokio::time::Instant::now();
    let got = f.fetch_followed_creators(USER, DELAY).await.unwrap();
    assert_eq!(got.len(), 120);
    assert_eq!(
        fake.calls(),
        vec![Call::Follow { page: 1 }, Call::Follow { page: 2 }, Call::Follow { page: 3 }]
    );
    // one delay between each pair of pages
    assert!(started.elapsed() >= DELAY * 2);

    let cached: Option<Vec<Creator>> = cache::get_json(store.as_ref(), &keys::follow_list(PLATFORM, USER))
        .await
        .unwrap();
    assert_eq!(cached.map(|c| c.len()), Some(120));

    fake.clear_calls();
    let again = f.fetch_followed_creators(USER, DELAY).await.unwrap();
    assert_eq!(again.len(), 120);
    assert_eq!(fake.follow_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stops_at_max_creators() {
    let fake = FakePlatform::new();
    let all: Vec<Creator> = (1..=200).map(creator).collect();
    fake.set_follow_list(&all, 50);
    let store = Arc::new(MemoryCacheStore::new());
    let cfg = FollowConfig {
        page_size: 50,
        max_creators: 60,
        ..Default::default()
    };

    let got = fetcher(&fake, &store, cfg)
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap();
    assert_eq!(got.len(), 60);
    assert_eq!(fake.follow_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cap_applies_when_last_page_is_short() {
    let fake = FakePlatform::new();
    let all: Vec<Creator> = (1..=80).map(creator).collect();
    fake.set_follow_list(&all, 50);
    let store = Arc::new(MemoryCacheStore::new());
    let cfg = FollowConfig {
        page_size: 50,
        max_creators: 60,
        ..Default::default()
    };

    let got = fetcher(&fake, &store, cfg)
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap();
    assert_eq!(got.len(), 60);
    assert_eq!(got[59], all[59]);

    let cached: Option<Vec<Creator>> = cache::get_json(store.as_ref(), &keys::follow_list(PLATFORM, USER))
        .await
        .unwrap();
    assert_eq!(cached.map(|c| c.len()), Some(60));
}

#[tokio::test(start_paused = true)]
async fn cap_below_page_size_applies_to_first_page() {
    let fake = FakePlatform::new();
    let all: Vec<Creator> = (1..=30).map(creator).collect();
    fake.set_follow_list(&all, 50);
    let store = Arc::new(MemoryCacheStore::new());
    let cfg = FollowConfig {
        page_size: 50,
        max_creators: 10,
        ..Default::default()
    };

    let got = fetcher(&fake, &store, cfg)
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap();
    assert_eq!(got.len(), 10);
    assert_eq!(fake.follow_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_session_is_fatal_before_any_request() {
    let fake = FakePlatform::new();
    fake.set_logged_in(false);
    fake.set_follow_list(&[creator(1)], 50);
    let store = Arc::new(MemoryCacheStore::new());

    let err = fetcher(&fake, &store, small_pages())
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap_err();
    assert_eq!(err, FeedError::NotAuthenticated);
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_follow_list_is_reported() {
    let fake = FakePlatform::new();
    let store = Arc::new(MemoryCacheStore::new());

    let err = fetcher(&fake, &store, small_pages())
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap_err();
    assert_eq!(err, FeedError::NoFollowedCreators);
    assert_eq!(store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn first_page_failure_propagates() {
    let fake = FakePlatform::new();
    fake.set_follow_page(1, Err(FeedError::TransientNetwork("reset".into())));
    let store = Arc::new(MemoryCacheStore::new());

    let err = fetcher(&fake, &store, small_pages())
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::TransientNetwork(_)));
}

#[tokio::test(start_paused = true)]
async fn later_page_failure_keeps_partial_list_uncached() {
    let fake = FakePlatform::new();
    let first: Vec<Creator> = (1..=50).map(creator).collect();
    fake.set_follow_page(1, Ok(first));
    fake.set_follow_page(2, Err(support::rate_limited()));
    let store = Arc::new(MemoryCacheStore::new());
    let f = fetcher(&fake, &store, small_pages());

    let got = f.fetch_followed_creators(USER, DELAY).await.unwrap();
    assert_eq!(got.len(), 50);
    assert!(store.get_value(&keys::follow_list(PLATFORM, USER)).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn duplicate_creators_across_pages_collapse() {
    let fake = FakePlatform::new();
    let mut page1: Vec<Creator> = (1..=50).map(creator).collect();
    page1[49] = creator(1);
    fake.set_follow_page(1, Ok(page1));
    fake.set_follow_page(2, Ok(vec![creator(1), creator(51)]));
    let store = Arc::new(MemoryCacheStore::new());

    let got = fetcher(&fake, &store, small_pages())
        .fetch_followed_creators(USER, DELAY)
        .await
        .unwrap();
    assert_eq!(got.len(), 50);
    assert_eq!(got.last().map(|c| c.id.as_str()), Some("fake:51"));
}
