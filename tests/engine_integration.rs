//! End-to-end tests over the cache, metadata store, and service, using a
//! directory-backed remote store and a deterministic embedder.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use paperscope::arxiv::ResolvedPaper;
use paperscope::{
    CacheState, EmbedMode, Embedder, Embedding, Error, FsRemoteStore, IndexCache, MetadataStore,
    RecommendationService, RemoteIndexStore, Result, SqliteMetadataStore, VectorIndex,
};
use tempfile::TempDir;

const DIMS: usize = 16;
const KEY: &str = "data/paper_index.bin";

/// Deterministic embedder: identical text embeds identically, distinct
/// text diverges. No network involved.
struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed(&self, text: &str, _mode: EmbedMode) -> Result<Embedding> {
        let seed = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let raw: Vec<f32> = (0..DIMS)
            .map(|i| {
                let x = seed.wrapping_mul(i as u64 + 1) % 1000;
                (x as f32 / 500.0) - 1.0 + 0.001
            })
            .collect();
        Embedding::new(raw)
    }
}

/// Remote store wrapper that counts fetches.
struct CountingStore {
    inner: FsRemoteStore,
    fetches: AtomicUsize,
}

impl RemoteIndexStore for CountingStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(key)
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.inner.store(key, bytes)
    }
}

fn resolved(arxiv_id: &str, title: &str) -> ResolvedPaper {
    ResolvedPaper {
        arxiv_id: arxiv_id.to_string(),
        title: title.to_string(),
        authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
        url: format!("https://arxiv.org/abs/{arxiv_id}"),
        abstract_text: format!("abstract of {title}"),
    }
}

fn seed_remote(dir: &TempDir) -> Arc<FsRemoteStore> {
    let remote = FsRemoteStore::new(dir.path().join("remote")).expect("remote failed");
    let empty = VectorIndex::new(DIMS);
    remote
        .store(KEY, &empty.to_bytes().expect("serialize failed"))
        .expect("store failed");
    Arc::new(remote)
}

fn build_service(dir: &TempDir, remote: Arc<dyn RemoteIndexStore>) -> (RecommendationService, Arc<IndexCache>) {
    let cache = Arc::new(
        IndexCache::new(DIMS, dir.path().join("local/index.bin"), KEY, remote)
            .expect("cache failed"),
    );
    let store = Arc::new(SqliteMetadataStore::in_memory().expect("store failed"));
    let service = RecommendationService::new(Arc::clone(&cache), store, Arc::new(HashEmbedder));
    (service, cache)
}

#[test]
fn concurrent_cold_start_fetches_remote_exactly_once() {
    let dir = TempDir::new().expect("tempdir failed");
    let counting = {
        let inner = FsRemoteStore::new(dir.path().join("remote")).expect("remote failed");
        let empty = VectorIndex::new(DIMS);
        inner
            .store(KEY, &empty.to_bytes().expect("serialize failed"))
            .expect("store failed");
        Arc::new(CountingStore {
            inner,
            fetches: AtomicUsize::new(0),
        })
    };

    let cache = Arc::new(
        IndexCache::new(
            DIMS,
            dir.path().join("local/index.bin"),
            KEY,
            Arc::clone(&counting) as Arc<dyn RemoteIndexStore>,
        )
        .expect("cache failed"),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.ensure_ready())
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked").expect("ensure_ready failed");
    }

    assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(cache.state(), CacheState::Ready);
}

#[test]
fn publish_and_recommend_end_to_end() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = seed_remote(&dir);
    let (service, cache) = build_service(&dir, remote);

    let titles = [
        "neural machine translation by jointly learning to align",
        "deep residual learning for image recognition",
        "language models are few shot learners",
        "denoising diffusion probabilistic models",
        "an image is worth 16x16 words",
    ];
    for (i, title) in titles.iter().enumerate() {
        let record = service
            .publish_resolved(&resolved(&format!("2001.{i:05}"), title))
            .expect("publish failed");
        assert_eq!(record.id, i as i64);
    }
    assert_eq!(cache.len().expect("len failed"), titles.len());

    // Query with the exact stored document text of the fourth paper: rank
    // order preserved through the metadata join, top score ~100.
    let query = format!("{} abstract of {}", titles[3], titles[3]);
    let results = service.recommend(&query, 3).expect("recommend failed");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].paper.arxiv_id, "2001.00003");
    assert!((results[0].score - 100.0).abs() < 1e-3);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for rec in &results {
        assert!((-100.0..=100.0).contains(&rec.score));
        assert!(!rec.paper.authors.is_empty());
    }
}

#[test]
fn recommend_with_k_larger_than_corpus_returns_available_count() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = seed_remote(&dir);
    let (service, _cache) = build_service(&dir, remote);

    service
        .publish_resolved(&resolved("2001.00001", "a single paper"))
        .expect("publish failed");

    let results = service.recommend("anything at all", 10).expect("recommend failed");
    assert_eq!(results.len(), 1);
}

#[test]
fn cold_start_against_empty_remote_fails_and_stays_failed() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = Arc::new(FsRemoteStore::new(dir.path().join("remote")).expect("remote failed"));
    let (service, cache) = build_service(&dir, remote);

    let err = service
        .recommend("anything", 3)
        .expect_err("cold start should fail");
    assert!(matches!(err, Error::NotReady { .. }));
    assert_eq!(cache.state(), CacheState::Failed);

    // Publishing is equally blocked until the remote copy exists.
    let err = service
        .publish_resolved(&resolved("2001.00001", "some paper"))
        .expect_err("publish should fail");
    assert!(err.is_retryable() || matches!(err, Error::Inconsistent { .. }));
    assert_eq!(cache.state(), CacheState::Failed);
}

#[test]
fn write_back_converges_a_second_process() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = seed_remote(&dir);

    // "Process A" publishes and persists.
    {
        let (service, cache) = build_service(&dir, Arc::clone(&remote) as Arc<dyn RemoteIndexStore>);
        service
            .publish_resolved(&resolved("2001.00001", "paper from process a"))
            .expect("publish failed");
        cache.flush().expect("flush failed");
    }

    // "Process B" has no local copy and converges through the remote store.
    let b_dir = TempDir::new().expect("tempdir failed");
    let cache_b = IndexCache::new(
        DIMS,
        b_dir.path().join("local/index.bin"),
        KEY,
        Arc::clone(&remote) as Arc<dyn RemoteIndexStore>,
    )
    .expect("cache failed");
    assert_eq!(cache_b.len().expect("len failed"), 1);
}

#[test]
fn repeated_flush_of_same_state_is_byte_identical() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = seed_remote(&dir);
    let (service, cache) = build_service(&dir, Arc::clone(&remote) as Arc<dyn RemoteIndexStore>);

    service
        .publish_resolved(&resolved("2001.00001", "idempotence check"))
        .expect("publish failed");

    cache.flush().expect("flush failed");
    let first = remote.fetch(KEY).expect("fetch failed");
    cache.flush().expect("flush failed");
    let second = remote.fetch(KEY).expect("fetch failed");
    assert_eq!(first, second);
}

#[test]
fn metadata_and_index_stay_aligned_under_concurrent_publishes() {
    let dir = TempDir::new().expect("tempdir failed");
    let remote = seed_remote(&dir);
    let cache = Arc::new(
        IndexCache::new(
            DIMS,
            dir.path().join("local/index.bin"),
            KEY,
            remote as Arc<dyn RemoteIndexStore>,
        )
        .expect("cache failed"),
    );
    let store: Arc<SqliteMetadataStore> =
        Arc::new(SqliteMetadataStore::in_memory().expect("store failed"));
    let service = Arc::new(RecommendationService::new(
        Arc::clone(&cache),
        Arc::clone(&store) as Arc<dyn MetadataStore>,
        Arc::new(HashEmbedder),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.publish_resolved(&resolved(
                    &format!("2002.{i:05}"),
                    &format!("concurrent paper {i}"),
                ))
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let record = handle.join().expect("thread panicked").expect("publish failed");
        ids.push(record.id);
    }

    ids.sort_unstable();
    assert_eq!(ids, (0..8).collect::<Vec<i64>>());
    assert_eq!(cache.len().expect("len failed"), 8);
    assert_eq!(store.count().expect("count failed"), 8);
}
