//! B+tree and hash-trie benchmarks over the in-memory chunk store.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mdx_index::{BTree, BTreeConfig, HashTrie, TrieConfig};
use mdx_store::InMemoryChunkStore;

fn key(i: usize) -> Vec<u8> {
    format!("key{i:08}").into_bytes()
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for count in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("btree_buffered", count), &count, |b, &count| {
            b.iter(|| {
                let store = Arc::new(InMemoryChunkStore::new());
                let mut tree = BTree::open(store, BTreeConfig::default(), None).unwrap();
                tree.start_buffer();
                for i in 0..count {
                    tree.put(&key(i), b"value").unwrap();
                }
                black_box(tree.flush_buffer().unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("trie_buffered", count), &count, |b, &count| {
            b.iter(|| {
                let store = Arc::new(InMemoryChunkStore::new());
                let mut trie = HashTrie::open(store, TrieConfig::default(), None).unwrap();
                trie.start_buffer();
                for i in 0..count {
                    trie.put(&key(i), b"value").unwrap();
                }
                black_box(trie.flush_buffer().unwrap())
            });
        });
    }

    group.bench_function("btree_write_through_1000", |b| {
        b.iter(|| {
            let store = Arc::new(InMemoryChunkStore::new());
            let mut tree = BTree::open(store, BTreeConfig::default(), None).unwrap();
            for i in 0..1_000 {
                tree.put(&key(i), b"value").unwrap();
            }
            black_box(tree.root_id())
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let count = 10_000;
    let store = Arc::new(InMemoryChunkStore::new());

    let mut tree = BTree::open(store.clone(), BTreeConfig::default(), None).unwrap();
    tree.start_buffer();
    for i in 0..count {
        tree.put(&key(i), b"value").unwrap();
    }
    let root = tree.flush_buffer().unwrap();

    group.bench_function("btree_resident", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % count;
            black_box(tree.get(&key(i)).unwrap())
        });
    });

    group.bench_function("btree_cold_open", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % count;
            let mut cold = BTree::open(store.clone(), BTreeConfig::default(), Some(root)).unwrap();
            black_box(cold.get(&key(i)).unwrap())
        });
    });

    group.bench_function("btree_scan", |b| {
        b.iter(|| {
            let mut cursor = tree.seek_first().unwrap();
            let mut n = 0;
            while cursor.next(&mut tree).unwrap().is_some() {
                n += 1;
            }
            black_box(n)
        });
    });

    let mut trie = HashTrie::open(store, TrieConfig::default(), None).unwrap();
    trie.start_buffer();
    for i in 0..count {
        trie.put(&key(i), b"value").unwrap();
    }
    trie.flush_buffer().unwrap();

    group.bench_function("trie_resident", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % count;
            black_box(trie.get(&key(i)).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
