use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lendhub::model::{ItemId, UserId};
use lendhub::{BookingBucket, Engine};

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn print_latency(label: &str, latencies: &mut Vec<Duration>) {
    latencies.sort_unstable();
    let ms = |d: Duration| d.as_secs_f64() * 1000.0;
    let at = |p: f64| {
        let idx = (latencies.len() as f64 * p / 100.0) as usize;
        latencies[idx.min(latencies.len() - 1)]
    };
    let avg = latencies.iter().sum::<Duration>() / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        ms(avg),
        ms(at(50.0)),
        ms(at(95.0)),
        ms(at(99.0)),
        ms(*latencies.last().unwrap()),
    );
}

struct Fixture {
    owner: UserId,
    bookers: Vec<UserId>,
    items: Vec<ItemId>,
}

async fn setup(engine: &Engine) -> Fixture {
    let owner = engine
        .create_user("bench-owner".into(), "owner@bench.local".into())
        .await
        .unwrap()
        .id;

    let mut bookers = Vec::new();
    for i in 0..10 {
        let id = engine
            .create_user(format!("bench-booker-{i}"), format!("booker{i}@bench.local"))
            .await
            .unwrap()
            .id;
        bookers.push(id);
    }

    let mut items = Vec::new();
    for i in 0..10 {
        let id = engine
            .create_item(
                owner,
                format!("bench-item-{i}"),
                "stress fixture".into(),
                true,
                None,
            )
            .await
            .unwrap()
            .id;
        items.push(id);
    }

    println!("  created {} bookers, {} items", bookers.len(), items.len());
    Fixture { owner, bookers, items }
}

async fn phase1_sequential(engine: &Engine, fx: &Fixture) {
    let booker = fx.bookers[0];
    let item = fx.items[0];
    let base = now_ms();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = base + (i as i64) * HOUR;
        let e = s + HOUR;
        let t = Instant::now();
        engine.create_booking(booker, item, s, e).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(engine: &Arc<Engine>, fx: &Fixture) {
    let n_tasks = 10;
    let n_per_task = 200;
    let base = now_ms();

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        let booker = fx.bookers[i % fx.bookers.len()];
        let item = fx.items[i % fx.items.len()];

        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let s = base + ((i * n_per_task + j) as i64) * HOUR;
                let e = s + HOUR;
                engine.create_booking(booker, item, s, e).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(engine: &Arc<Engine>, fx: &Fixture) {
    let base = now_ms();

    // Pre-fill so the dashboard query has something to chew on
    for i in 0..200 {
        let s = base + (i as i64) * HOUR;
        engine
            .create_booking(fx.bookers[1], fx.items[1], s, s + HOUR)
            .await
            .unwrap();
    }

    // Writer tasks: continuously add bookings in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5usize {
        let engine = engine.clone();
        let stop = stop.clone();
        let booker = fx.bookers[2 + w % 5];
        let item = fx.items[2 + w % 5];
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = base + (w as i64 * 100_000 + i) * HOUR;
                let _ = engine.create_booking(booker, item, s, s + HOUR).await;
                i += 1;
            }
        }));
    }

    // Reader tasks: pull the owner dashboard and booker listings under load
    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let engine = engine.clone();
        let owner = fx.owner;
        let booker = fx.bookers[r % fx.bookers.len()];
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                if i % 2 == 0 {
                    engine.owner_items_detail(owner).await.unwrap();
                } else {
                    engine
                        .list_for_booker(booker, BookingBucket::Future, 0, 50)
                        .await
                        .unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("dashboard/listing query", &mut all_latencies);
}

async fn phase4_decision_storm(engine: &Arc<Engine>, fx: &Fixture) {
    let n_bookings = 500;
    let base = now_ms() + 500_000 * HOUR;

    // Seed a pile of waiting requests on one item
    let mut ids = Vec::with_capacity(n_bookings);
    for i in 0..n_bookings {
        let s = base + (i as i64) * HOUR;
        let b = engine
            .create_booking(fx.bookers[i % fx.bookers.len()], fx.items[9], s, s + HOUR)
            .await
            .unwrap();
        ids.push(b.id);
    }

    // The owner clears the backlog from concurrent tasks
    let start = Instant::now();
    let decided = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for (i, id) in ids.into_iter().enumerate() {
        let engine = engine.clone();
        let decided = decided.clone();
        let owner = fx.owner;
        handles.push(tokio::spawn(async move {
            if engine.decide_booking(owner, id, i % 3 != 0).await.is_ok() {
                decided.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = decided.load(Ordering::Relaxed);
    let ops = ok as f64 / elapsed.as_secs_f64();
    println!(
        "  {ok}/{n_bookings} decisions in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let data_dir: PathBuf = std::env::var("LENDHUB_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("lendhub_bench"));
    std::fs::create_dir_all(&data_dir).expect("create data dir");
    let wal = data_dir.join(format!("stress_{}.wal", std::process::id()));
    let _ = std::fs::remove_file(&wal);

    println!("=== lendhub stress benchmark ===");
    println!("wal: {}\n", wal.display());

    let engine = Arc::new(Engine::new(wal).expect("engine start"));

    println!("[setup]");
    let fx = setup(&engine).await;

    println!("\n[phase 1] sequential write throughput");
    phase1_sequential(&engine, &fx).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&engine, &fx).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&engine, &fx).await;

    println!("\n[phase 4] decision storm");
    phase4_decision_storm(&engine, &fx).await;

    println!("\n=== benchmark complete ===");
}
