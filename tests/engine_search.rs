use std::sync::Arc;

use embedx_db::{Embedder, EngineError, KernelConfig, MemoryStore, RocksStore, VectorStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

const DIM: usize = 64;

fn random_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

fn brute_force_ids(vectors: &[(String, Vec<f32>)], query: &[f32], k: usize) -> Vec<String> {
    let mut scored: Vec<(String, f32)> = vectors
        .iter()
        .map(|(id, v)| (id.clone(), embedx_db::cosine(query, v).unwrap()))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.into_iter().take(k).map(|(id, _)| id).collect()
}

#[test]
fn test_engine_matches_reference_ranking() {
    let mut rng = StdRng::seed_from_u64(2024);
    let engine = Embedder::new(MemoryStore::new());

    let vectors: Vec<(String, Vec<f32>)> = (0..300)
        .map(|i| (format!("doc-{i}"), random_vector(&mut rng, DIM)))
        .collect();
    for (id, v) in &vectors {
        engine.add(id, v).unwrap();
    }

    for _ in 0..5 {
        let query = random_vector(&mut rng, DIM);
        let results = engine.search(&query, 10).unwrap();
        let got: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(got, brute_force_ids(&vectors, &query, 10));
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
    }
}

#[test]
fn test_engine_over_rocks_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vectors");

    {
        let engine = Embedder::new(RocksStore::open(&path).unwrap());
        engine.add("a", &[1.0, 0.0]).unwrap();
        engine.add("b", &[0.0, 1.0]).unwrap();
        engine.add("c", &[1.0, 1.0]).unwrap();
        engine.close().unwrap();
    }

    let engine = Embedder::new(RocksStore::open(&path).unwrap());
    let results = engine.search(&[1.0, 0.0], 2).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[test]
fn test_engine_on_closed_store_reports_store_error() {
    let dir = tempdir().unwrap();
    let engine = Embedder::new(RocksStore::open(dir.path().join("vectors")).unwrap());
    engine.add("a", &[1.0]).unwrap();
    engine.close().unwrap();

    assert!(matches!(engine.search(&[1.0], 1), Err(EngineError::Store(_))));
}

#[test]
fn test_shared_store_with_concurrent_readers() {
    let store = Arc::new(MemoryStore::new());
    let engine = Embedder::with_config(store.clone(), &KernelConfig::default());

    let mut rng = StdRng::seed_from_u64(11);
    for i in 0..100 {
        store
            .save_vector(&format!("v{i}"), &random_vector(&mut rng, 16))
            .unwrap();
    }
    let query = random_vector(&mut rng, 16);
    let expected = engine.search(&query, 5).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let results = engine.search(&query, 5).unwrap();
                let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
                let want: Vec<&str> = expected.iter().map(|r| r.id.as_str()).collect();
                assert_eq!(ids, want);
            });
        }
    });
}

#[test]
fn test_mixed_dimensions_only_match_query_dimension() {
    let engine = Embedder::new(MemoryStore::new());
    engine.add("two", &[1.0, 0.0]).unwrap();
    engine.add("three", &[1.0, 0.0, 0.0]).unwrap();
    engine.add("four", &[1.0, 0.0, 0.0, 0.0]).unwrap();

    for (query, id) in [
        (vec![1.0, 0.0], "two"),
        (vec![1.0, 0.0, 0.0], "three"),
        (vec![1.0, 0.0, 0.0, 0.0], "four"),
    ] {
        let results = engine.search(&query, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
    }
}
