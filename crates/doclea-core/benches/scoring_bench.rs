//! Scoring / decay benchmarks.
//! Run with: cargo bench -p doclea-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeSet;

use doclea_core::decay::{effective_confidence, DecayConfig};
use doclea_core::memory::{Memory, MemoryType};
use doclea_core::scoring::{rerank, ScoringConfig};

fn sample_memory(i: usize) -> Memory {
    Memory {
        id: format!("m{i}"),
        memory_type: MemoryType::Note,
        title: format!("memory {i}"),
        content: "we use connection pooling for database access".to_string(),
        summary: None,
        importance: 0.3 + (i % 7) as f32 * 0.1,
        tags: BTreeSet::new(),
        related_files: vec![],
        git_commit: None,
        source_pr: None,
        experts: BTreeSet::new(),
        created_at: 0,
        accessed_at: (i as i64) * 86_400,
        access_count: (i % 20) as i64,
        needs_review: false,
        vector_id: None,
        decay_rate: None,
        last_refreshed_at: None,
        confidence_floor: None,
        decay_function: None,
    }
}

fn bench_rerank_200(c: &mut Criterion) {
    let config = ScoringConfig::default();
    let candidates: Vec<(Memory, f32)> = (0..200).map(|i| (sample_memory(i), (i % 100) as f32 / 100.0)).collect();

    c.bench_function("rerank_200_candidates", |b| {
        b.iter(|| {
            black_box(rerank(candidates.clone(), &config, 30 * 86_400, 10));
        })
    });
}

fn bench_effective_confidence(c: &mut Criterion) {
    let config = DecayConfig::default();
    let memory = sample_memory(42);

    c.bench_function("effective_confidence", |b| {
        b.iter(|| {
            black_box(effective_confidence(&memory, &config, 60 * 86_400));
        })
    });
}

criterion_group!(benches, bench_rerank_200, bench_effective_confidence);
criterion_main!(benches);
