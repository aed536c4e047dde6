use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use vacancy::{
    CacheTtlMs, CounterMode, HybridCounter, RedisKey, StockService, config::VacancyConfig,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Backend {
    /// One in-process counter shared by every task.
    Memory,
    /// `--instances` hybrid counters coordinating through Redis.
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vacancy-stress",
    about = "Load harness that hammers a stock counter and checks it never oversells"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    /// Concurrent client tasks.
    #[arg(long, default_value_t = 64)]
    tasks: usize,

    /// Simulated service instances (redis backend only).
    #[arg(long, default_value_t = 3)]
    instances: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    /// Defaults to `INITIAL_STOCK`.
    #[arg(long)]
    initial_stock: Option<u64>,

    /// Each reservation asks for 1..=qty_max tickets.
    #[arg(long, default_value_t = 4)]
    qty_max: u64,

    /// Fraction of operations that are availability reads.
    #[arg(long, default_value_t = 0.5)]
    read_ratio: f64,

    #[arg(long, default_value_t = 10)]
    sample_every: u64,

    /// Per-task rate when `--mode target-qps`.
    #[arg(long)]
    target_qps: Option<u64>,

    /// Defaults to `REDIS_URL`, then `redis://127.0.0.1:16379/`.
    #[arg(long)]
    redis_url: Option<String>,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Default)]
struct Counts {
    reserved_ops: AtomicU64,
    reserved_units: AtomicU64,
    insufficient: AtomicU64,
    reads: AtomicU64,
    errors: AtomicU64,
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter % sample_every == 0
}

async fn build_services(
    args: &Args,
    config: &VacancyConfig,
    initial_stock: u64,
) -> Result<Vec<StockService<HybridCounter>>, vacancy::VacancyError> {
    let cache_ttl = CacheTtlMs::from(config.cache_ttl_ms);

    match args.backend {
        Backend::Memory => Ok(vec![StockService::new(Arc::new(HybridCounter::in_memory(
            initial_stock,
            cache_ttl,
        )))]),
        Backend::Redis => {
            let run_id = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();

            let mut options = config.hybrid_options()?;
            options.redis_url = Some(
                args.redis_url
                    .clone()
                    .or_else(|| config.redis.url.clone())
                    .unwrap_or_else(|| "redis://127.0.0.1:16379/".to_string()),
            );
            options.initial_stock = initial_stock;
            options.counter.prefix =
                RedisKey::try_from(format!("{}_{run_id}", args.redis_prefix))?;

            let mut services = Vec::with_capacity(args.instances.max(1));
            for _ in 0..args.instances.max(1) {
                let counter = HybridCounter::initialize(options.clone()).await;
                services.push(StockService::new(Arc::new(counter)));
            }

            Ok(services)
        }
    }
}

fn print_results(
    args: &Args,
    elapsed: Duration,
    initial_stock: u64,
    remaining: u64,
    hist: &Histogram<u64>,
    counts: &Counts,
    demoted: usize,
) {
    let reserved_units = counts.reserved_units.load(Ordering::Relaxed);
    let ops = counts.reserved_ops.load(Ordering::Relaxed)
        + counts.insufficient.load(Ordering::Relaxed)
        + counts.reads.load(Ordering::Relaxed)
        + counts.errors.load(Ordering::Relaxed);
    let ops_s = ops as f64 / elapsed.as_secs_f64();

    if args.json {
        let summary = json!({
            "backend": format!("{:?}", args.backend),
            "tasks": args.tasks,
            "elapsed_s": elapsed.as_secs_f64(),
            "ops": ops,
            "ops_per_s": ops_s,
            "reserved_ops": counts.reserved_ops.load(Ordering::Relaxed),
            "reserved_units": reserved_units,
            "insufficient": counts.insufficient.load(Ordering::Relaxed),
            "reads": counts.reads.load(Ordering::Relaxed),
            "errors": counts.errors.load(Ordering::Relaxed),
            "initial_stock": initial_stock,
            "remaining": remaining,
            "demoted_instances": demoted,
            "lat_us": {
                "p50": hist.value_at_quantile(0.50),
                "p99": hist.value_at_quantile(0.99),
                "max": hist.max(),
            },
        });
        println!("{summary}");
        return;
    }

    println!(
        "backend={:?} mode={:?} tasks={} instances={}",
        args.backend, args.mode, args.tasks, args.instances
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops_s
    );
    println!(
        "reserved_ops={} reserved_units={} insufficient={} reads={} errors={}",
        counts.reserved_ops.load(Ordering::Relaxed),
        reserved_units,
        counts.insufficient.load(Ordering::Relaxed),
        counts.reads.load(Ordering::Relaxed),
        counts.errors.load(Ordering::Relaxed)
    );
    println!("initial_stock={initial_stock} remaining={remaining} demoted_instances={demoted}");
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

async fn run(args: Args, config: VacancyConfig) -> Result<bool, vacancy::VacancyError> {
    let initial_stock = args.initial_stock.unwrap_or(config.initial_stock);
    let services = build_services(&args, &config, initial_stock).await?;

    // The stock may already exist under the prefix; measure from what is there.
    let start_stock = services[0].counter().get_current(false).await?;

    let counts = Arc::new(Counts::default());
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let mut join = Vec::with_capacity(args.tasks);
    for t in 0..args.tasks {
        let service = services[t % services.len()].clone();
        let counts = Arc::clone(&counts);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1).wrapping_mul(0xD134_2543_DE82_EF95);
            let mut next_deadline = Instant::now();

            let mut rng_u64 = || {
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while Instant::now() < deadline {
                if args.mode == Mode::TargetQps {
                    if let Some(qps) = args.target_qps {
                        let per_op_ns = 1_000_000_000u64 / qps.max(1);
                        let now = Instant::now();
                        if now < next_deadline {
                            tokio::time::sleep(next_deadline - now).await;
                        }
                        next_deadline += Duration::from_nanos(per_op_ns);
                    }
                }

                let is_read = (rng_u64() % 10_000) as f64 / 10_000.0 < args.read_ratio;
                let op_started = Instant::now();

                if is_read {
                    match service.get_available().await {
                        Ok(_) => counts.reads.fetch_add(1, Ordering::Relaxed),
                        Err(_) => counts.errors.fetch_add(1, Ordering::Relaxed),
                    };
                } else {
                    let qty = 1 + rng_u64() % args.qty_max.max(1);
                    match service.reserve(qty as i64).await {
                        Ok(outcome) if outcome.success => {
                            counts.reserved_ops.fetch_add(1, Ordering::Relaxed);
                            counts.reserved_units.fetch_add(qty, Ordering::Relaxed);
                        }
                        Ok(_) => {
                            counts.insufficient.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "stress.reserve.error");
                            counts.errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }

                if should_sample(i, args.sample_every) {
                    let us = op_started.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }
                i += 1;
            }

            hist
        }));
    }

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for h in join {
        let hist = h.await.unwrap();
        merged.add(&hist).unwrap();
    }

    let elapsed = started.elapsed();
    let remaining = services[0].counter().get_current(false).await?;
    let demoted = services
        .iter()
        .filter(|s| s.counter().mode() == CounterMode::FallbackActive)
        .count();

    print_results(
        &args,
        elapsed,
        start_stock,
        remaining,
        &merged,
        &counts,
        demoted,
    );

    // Fallback counters are per instance, so conservation only holds while
    // every instance shares one source of truth.
    let shared_truth = args.backend == Backend::Memory || demoted == 0;
    let reserved = counts.reserved_units.load(Ordering::Relaxed);

    if shared_truth && reserved + remaining != start_stock {
        tracing::error!(
            start_stock,
            reserved,
            remaining,
            "stress.conservation.violated"
        );
        return Ok(false);
    }

    Ok(true)
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match VacancyConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    match rt.block_on(run(args, config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "stress.failed");
            ExitCode::FAILURE
        }
    }
}
