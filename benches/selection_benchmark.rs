//! Selection and scoring benchmark
//!
//! Times greedy selection against the TopK baseline over random coverage
//! matrices, and isolation forest scoring over random feature tables.
//!
//! Run with: cargo bench --bench selection_benchmark

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lookout::graph::Graph;
use lookout::ml::{score_with, IsolationForest, ModelConfig};
use lookout::select::{select, Algorithm};

const ITERATIONS: u32 = 20;

/// Benchmark dimensions for selection
#[derive(Debug, Clone, Copy)]
struct SelectionCase {
    plots: usize,
    outliers: usize,
    budget: usize,
}

fn random_graph(case: SelectionCase, rng: &mut ChaCha8Rng) -> Graph {
    let rows = (0..case.plots)
        .map(|_| {
            let mut row: Vec<f64> = (0..case.outliers)
                .map(|_| 1.0 / rng.random_range(1..=case.outliers * 4) as f64)
                .collect();
            let max = row.iter().copied().fold(0.0, f64::max);
            row.iter_mut().for_each(|w| *w /= max);
            row
        })
        .collect();
    // Rows are equal length by construction
    match Graph::from_rows(rows) {
        Ok(graph) => graph,
        Err(e) => panic!("benchmark graph: {}", e),
    }
}

fn time_selection(graph: &Graph, budget: usize, algorithm: Algorithm) -> (Duration, f64) {
    let mut total = Duration::ZERO;
    let mut coverage = 0.0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let selection = match select(graph, budget, algorithm) {
            Ok(s) => s,
            Err(e) => panic!("selection failed: {}", e),
        };
        total += start.elapsed();
        coverage = graph.coverage_of(&selection);
    }
    (total / ITERATIONS, coverage)
}

fn bench_selection() {
    println!("\n=== Selection ({} iterations each) ===", ITERATIONS);
    println!(
        "{:>6} {:>9} {:>7} {:>10} {:>12} {:>10} {:>12}",
        "plots", "outliers", "budget", "lookout", "lookout_cov", "topk", "topk_cov"
    );

    let cases = [
        SelectionCase { plots: 22, outliers: 10, budget: 3 },
        SelectionCase { plots: 22, outliers: 100, budget: 5 },
        SelectionCase { plots: 200, outliers: 100, budget: 10 },
        SelectionCase { plots: 1000, outliers: 500, budget: 20 },
    ];

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for case in cases {
        let graph = random_graph(case, &mut rng);
        let (greedy_time, greedy_cov) = time_selection(&graph, case.budget, Algorithm::LookOut);
        let (topk_time, topk_cov) = time_selection(&graph, case.budget, Algorithm::TopK);

        println!(
            "{:>6} {:>9} {:>7} {:>10.2?} {:>12.3} {:>10.2?} {:>12.3}",
            case.plots, case.outliers, case.budget, greedy_time, greedy_cov, topk_time, topk_cov
        );
    }
}

fn bench_scoring() {
    println!("\n=== Isolation forest scoring ===");
    println!("{:>8} {:>9} {:>12} {:>12}", "entities", "features", "sequential", "parallel");

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for entities in [1_000, 10_000, 50_000] {
        let rows: Vec<Vec<f64>> = (0..entities)
            .map(|_| (0..8).map(|_| rng.random_range(0.0..100.0)).collect())
            .collect();

        let mut timings = Vec::with_capacity(2);
        for parallel in [false, true] {
            let config = ModelConfig {
                parallel,
                ..ModelConfig::default()
            };
            let mut forest = IsolationForest::new(&config);
            let start = Instant::now();
            if let Err(e) = score_with(&mut forest, &rows) {
                panic!("scoring failed: {}", e);
            }
            timings.push(start.elapsed());
        }

        println!(
            "{:>8} {:>9} {:>12.2?} {:>12.2?}",
            entities, 8, timings[0], timings[1]
        );
    }
}

fn main() {
    println!("LookOut benchmarks");
    bench_selection();
    bench_scoring();
}
