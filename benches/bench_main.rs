//! sish ベンチマーク: 分類器、ジョブテーブル、spawn、フル実行の計測。
//!
//! `std::time::Instant` による手動計測（外部クレート不要）。
//!
//! 実行: `cargo bench`

use std::time::{Duration, Instant};

use sish::config::Config;
use sish::job::JobTable;
use sish::shell::ShellSession;
use sish::signal::ForegroundSlot;
use sish::spawn::SpawnOptions;

// ── ベンチマークインフラ ──────────────────────────────────────────

struct BenchResult {
    category: &'static str,
    name: &'static str,
    avg: Duration,
    iters: u64,
}

impl BenchResult {
    fn print(&self) {
        let avg_us = self.avg.as_nanos() as f64 / 1000.0;
        println!(
            "[{:<8}] {:<40}: avg {:>10.2}µs  ({} iters)",
            self.category, self.name, avg_us, self.iters,
        );
    }
}

fn bench<F: FnMut()>(category: &'static str, name: &'static str, iters: u64, mut f: F) -> BenchResult {
    // ウォームアップ
    for _ in 0..iters.min(100) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    BenchResult {
        category,
        name,
        avg: elapsed / iters as u32,
        iters,
    }
}

fn print_all(results: &mut Vec<BenchResult>) {
    for r in results.iter() {
        r.print();
    }
    results.clear();
}

// ── メイン ────────────────────────────────────────────────────────

fn main() {
    println!("sish benchmark suite");
    println!("{}", "=".repeat(80));

    let mut results = Vec::new();

    // ── 分類器ベンチマーク ──
    println!("\n--- Classifier ---");

    for line in [
        "echo hello",
        "ls -la /usr/local/bin",
        "ls | wc -l",
        "sort data.txt > sorted.txt",
        "sleep 1 &",
    ] {
        let name: &'static str = Box::leak(line.to_string().into_boxed_str());
        results.push(bench("classify", name, 10_000, || {
            let _ = sish::parser::classify(line);
        }));
    }

    print_all(&mut results);

    // ── ジョブテーブル ──
    println!("\n--- Job table ---");

    results.push(bench("jobs", "append 100 + remove head", 1_000, || {
        let mut jobs = JobTable::new();
        for pid in 0..100 {
            jobs.append(pid, &["sleep", "10"]);
        }
        while jobs.remove_by_index(0).is_some() {}
    }));

    results.push(bench("jobs", "list 100", 1_000, || {
        let mut jobs = JobTable::new();
        for pid in 0..100 {
            jobs.append(pid, &["sleep", "10"]);
        }
        let _ = jobs.list().map(|l| l.to_string()).count();
    }));

    print_all(&mut results);

    // ── spawn ベンチマーク ──
    println!("\n--- Spawn (posix_spawnp) ---");

    results.push(bench("spawn", "/bin/true (posix_spawnp)", 1_000, || {
        if let Ok(pid) = sish::spawn::spawn(&["/bin/true"], &SpawnOptions::default()) {
            sish::job::wait_for(pid);
        }
    }));

    print_all(&mut results);

    // ── フル実行 (classify → execute) ──
    println!("\n--- Full (classify + spawn + wait) ---");

    let slot: &'static ForegroundSlot = Box::leak(Box::new(ForegroundSlot::new()));
    let mut session = ShellSession::with_slot(Config::default(), slot);

    results.push(bench("full", "/bin/echo hello > /dev/null", 1_000, || {
        let _ = session.run_line("/bin/echo hello > /dev/null");
    }));

    results.push(bench("full", "/bin/true | /bin/true", 500, || {
        let _ = session.run_line("/bin/true | /bin/true");
    }));

    print_all(&mut results);

    println!("\n{}", "=".repeat(80));
    println!("done.");
}
