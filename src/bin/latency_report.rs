use avl_exchange::{Order, OrderBook, Side};
use hdrhistogram::Histogram;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::time::Instant;

const RESTING: usize = 10_000;
const ITERATIONS: u64 = 1_000_000;

fn report(name: &str, histogram: &Histogram<u64>, total: std::time::Duration) {
    println!("\n=== {} Latency (ns) ===", name);
    println!("Total Ops:  {}", histogram.len());
    println!("Throughput: {:.2} ops/sec", histogram.len() as f64 / total.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Preparing Latency Benchmark...");

    let mut book = OrderBook::with_capacity(RESTING as u32 + 1);
    book.warm_up();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    // Keep a fixed number of orders resting; each iteration adds one and removes the oldest
    let mut resting = VecDeque::with_capacity(RESTING + 1);
    for i in 0..RESTING {
        let order = Order::with_id(format!("w{i}"), Side::Buy, rng.gen_range(1..=1_000));
        book.insert(order.clone());
        resting.push_back(order);
    }

    let mut insert_hist = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3)?;
    let mut remove_hist = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3)?;
    let mut insert_total = std::time::Duration::ZERO;
    let mut remove_total = std::time::Duration::ZERO;

    println!("Running {} iterations against {} resting orders...", ITERATIONS, RESTING);

    for i in 0..ITERATIONS {
        let order = Order::with_id(format!("o{i}"), Side::Buy, rng.gen_range(1..=1_000));

        let start = Instant::now();
        std::hint::black_box(book.insert(order.clone()));
        let elapsed = start.elapsed();
        // Outliers past the upper bound are dropped
        insert_hist.record(elapsed.as_nanos() as u64).unwrap_or(());
        insert_total += elapsed;
        resting.push_back(order);

        if let Some(oldest) = resting.pop_front() {
            let start = Instant::now();
            std::hint::black_box(book.remove(&oldest));
            let elapsed = start.elapsed();
            remove_hist.record(elapsed.as_nanos() as u64).unwrap_or(());
            remove_total += elapsed;
        }
    }

    report("Insert", &insert_hist, insert_total);
    report("Remove", &remove_hist, remove_total);

    let stats = book.pool_stats();
    println!("\nTree height: {} for {} orders", book.height(), book.len());
    println!(
        "Node pool:   allocated {} reused {} recycled {}",
        stats.allocated, stats.reused, stats.recycled
    );

    // Quick ASCII histogram
    println!("\nInsert distribution:");
    for v in insert_hist.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
    Ok(())
}
