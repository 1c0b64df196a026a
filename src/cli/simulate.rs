//! `simulate` command: drive synthetic jobs through the queue and limiter.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use scrapegate::work_queue::QueueStats;
use scrapegate::{
    AdmissionConfig, Clock, ManualClock, Priority, QueueError, QueueItem, RateLimiter,
    RequestQueue, RequestTarget, TokioClock,
};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of jobs to enqueue (priorities cycle high, normal, low)
    #[arg(short, long, default_value = "30")]
    jobs: usize,
    /// Concurrent dispatch workers
    #[arg(short, long, default_value = "4")]
    workers: usize,
    /// Retailer to target
    #[arg(short, long)]
    retailer: Option<String>,
    /// Domain to target
    #[arg(short, long)]
    domain: Option<String>,
    /// Simulated duration of each request in milliseconds
    #[arg(long, default_value = "50")]
    work_ms: u64,
    /// Make every Nth job fail (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: usize,
    /// Run against a virtual clock so waits complete instantly
    #[arg(long)]
    virtual_time: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug)]
struct Job {
    id: String,
    index: usize,
}

impl QueueItem for Job {
    fn queue_id(&self) -> &str {
        &self.id
    }
}

pub async fn cmd_simulate(config: &AdmissionConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let virtual_clock = args.virtual_time.then(|| Arc::new(ManualClock::new()));
    let clock: Arc<dyn Clock> = match &virtual_clock {
        Some(manual) => manual.clone() as Arc<dyn Clock>,
        None => Arc::new(TokioClock),
    };
    let limiter = config.build_limiter(clock).await?;
    let queue: Arc<RequestQueue<Job>> = Arc::new(config.build_queue());

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for index in 0..args.jobs {
        let job = Job {
            id: format!("job-{}", index),
            index,
        };
        match queue.put(job, Priority::ALL[index % 3]).await {
            Ok(()) => accepted += 1,
            Err(e @ QueueError::TierFull { .. }) => {
                warn!("{}", e);
                rejected += 1;
            }
        }
    }

    let pb = ProgressBar::new(accepted as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let base_target = RequestTarget {
        retailer: args.retailer.clone(),
        domain: args.domain.clone(),
        ..Default::default()
    };
    let work = Duration::from_millis(args.work_ms);

    let workers = (0..args.workers.max(1)).map(|_| {
        dispatch(
            queue.clone(),
            limiter.clone(),
            base_target.clone(),
            work,
            args.fail_every,
            pb.clone(),
        )
    });
    futures::future::join_all(workers).await;
    pb.finish_and_clear();

    let scopes = limiter.get_all_stats().await;
    let queue_stats = queue.get_stats().await;

    if args.json {
        let out = serde_json::json!({
            "rejected": rejected,
            "scopes": scopes,
            "queue": queue_stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{:<20} {:>7} {:>7} {:>9} {:>7} {:>9} {:>9}",
        "scope", "total", "ok", "throttled", "failed", "success%", "avg wait"
    );
    println!("{}", "-".repeat(75));
    for report in scopes.values() {
        println!(
            "{:<20} {:>7} {:>7} {:>9} {:>7} {:>8.1}% {:>8.2}s",
            report.scope,
            report.total_requests,
            report.successful_requests,
            report.throttled_requests,
            report.failed_requests,
            report.success_rate,
            report.avg_wait_secs
        );
    }
    println!();
    print_queue_stats(&queue_stats, rejected);
    if let Some(manual) = virtual_clock {
        println!(
            "{} {:?} of virtual time elapsed",
            style("Clock:").bold(),
            manual.elapsed()
        );
    }
    Ok(())
}

/// Pull jobs until the queue is empty, running each under admission control.
async fn dispatch(
    queue: Arc<RequestQueue<Job>>,
    limiter: RateLimiter,
    base_target: RequestTarget,
    work: Duration,
    fail_every: usize,
    pb: ProgressBar,
) {
    while let Some(entry) = queue.get().await {
        let target = base_target.clone().with_priority(entry.priority);
        let fails = fail_every > 0 && (entry.item.index + 1) % fail_every == 0;
        let clock = limiter.clock().clone();

        let result: Result<(), String> = limiter
            .run(&target, || async move {
                clock.sleep(work).await;
                if fails {
                    Err("simulated failure".to_string())
                } else {
                    Ok(())
                }
            })
            .await;

        queue.mark_completed(&entry.item.id, result.is_ok()).await;
        pb.set_message(entry.item.id.clone());
        pb.inc(1);
    }
}

fn print_queue_stats(stats: &QueueStats, rejected: usize) {
    println!(
        "{} {} completed, {} failed ({:.1}% success), {} rejected",
        style("Queue:").bold(),
        stats.total_completed,
        stats.total_failed,
        stats.success_rate,
        rejected
    );
    if stats.total > 0 || stats.processing > 0 {
        println!(
            "  {} still queued, {} in flight",
            style(stats.total).yellow(),
            stats.processing
        );
    }
}
