//! `hare-gate run`: queue consumers sharing one gate in front of a simulated
//! rate-limited service.

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use anyhow::{Result, bail};
use gate::{Disposition, FailureReport, RateLimitGate};
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  config::Config,
  queue::{Delivery, QueueStats, WorkQueue},
  simulation::{ChatRequest, SimulatedService},
};

/// What happened during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
  pub queue: QueueStats,
  pub completed: usize,
  pub reported: usize,
  pub accepted: usize,
  pub rejected: usize,
  pub outstanding: usize,
  pub elapsed: Duration,
}

#[derive(Default)]
struct Outcomes {
  completed: AtomicUsize,
  reported: AtomicUsize,
}

pub async fn cmd_run(config: Config) -> Result<()> {
  let gate = Arc::new(RateLimitGate::with_config(config.gate.clone()));
  let cancel = CancellationToken::new();

  // Handle ctrl-c gracefully
  let gate_for_signal = Arc::clone(&gate);
  let cancel_for_signal = cancel.clone();
  tokio::spawn(async move {
    if let Err(e) = signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
      return;
    }
    info!("Received ctrl-c, shutting down...");
    gate_for_signal.shutdown();
    cancel_for_signal.cancel();
  });

  let summary = simulate(&config, gate, cancel).await?;

  println!("Requests:    {}", summary.queue.pushed);
  println!("Completed:   {}", summary.completed);
  println!("Reported:    {}", summary.reported);
  println!("Acked:       {}", summary.queue.acked);
  println!("Requeued:    {}", summary.queue.requeued);
  println!("Left:        {}", summary.queue.left);
  println!("Outstanding: {}", summary.outstanding);
  println!(
    "Service:     {} accepted, {} rate-limited",
    summary.accepted, summary.rejected
  );
  println!("Elapsed:     {:.2}s", summary.elapsed.as_secs_f64());

  Ok(())
}

/// Push `simulation.requests` items and consume them with
/// `simulation.workers` consumers until the queue drains or `cancel` fires.
pub async fn simulate(config: &Config, gate: Arc<RateLimitGate>, cancel: CancellationToken) -> Result<RunSummary> {
  let settings = &config.simulation;
  if settings.workers == 0 {
    bail!("simulation.workers must be at least 1");
  }

  let started = Instant::now();
  let service = Arc::new(SimulatedService::new(settings));
  let queue = Arc::new(WorkQueue::new());
  let outcomes = Arc::new(Outcomes::default());

  for id in 0..settings.requests {
    queue.push(ChatRequest {
      id,
      prompt: format!("request #{id}"),
    });
  }
  info!(
    requests = settings.requests,
    workers = settings.workers,
    "Starting consumers"
  );

  let mut workers = JoinSet::new();
  for worker in 0..settings.workers {
    workers.spawn(consume(
      worker,
      Arc::clone(&gate),
      Arc::clone(&service),
      Arc::clone(&queue),
      Arc::clone(&outcomes),
      cancel.child_token(),
    ));
  }

  tokio::select! {
    _ = queue.drained() => info!("All requests settled"),
    _ = cancel.cancelled() => info!("Run cancelled"),
  }

  gate.shutdown();
  cancel.cancel();
  while let Some(result) = workers.join_next().await {
    if let Err(e) = result {
      warn!("Consumer task failed: {}", e);
    }
  }

  Ok(RunSummary {
    queue: queue.stats(),
    completed: outcomes.completed.load(Ordering::Relaxed),
    reported: outcomes.reported.load(Ordering::Relaxed),
    accepted: service.accepted(),
    rejected: service.rejected(),
    outstanding: queue.outstanding(),
    elapsed: started.elapsed(),
  })
}

async fn consume(
  worker: usize,
  gate: Arc<RateLimitGate>,
  service: Arc<SimulatedService>,
  queue: Arc<WorkQueue<ChatRequest>>,
  outcomes: Arc<Outcomes>,
  cancel: CancellationToken,
) {
  while let Some(delivery) = queue.next(&cancel).await {
    settle(worker, &gate, &service, &queue, &outcomes, &cancel, delivery).await;
  }
  debug!(worker, "Consumer stopped");
}

async fn settle(
  worker: usize,
  gate: &RateLimitGate,
  service: &SimulatedService,
  queue: &WorkQueue<ChatRequest>,
  outcomes: &Outcomes,
  cancel: &CancellationToken,
  delivery: Delivery<ChatRequest>,
) {
  let request = &delivery.item;
  let outcome = gate.execute(cancel, move || service.chat(request)).await;

  match &outcome {
    Ok(response) => {
      outcomes.completed.fetch_add(1, Ordering::Relaxed);
      debug!(worker, id = response.id, reply = %response.reply, "Request completed");
    }
    Err(error) => {
      if let Some(report) = FailureReport::from_error(error) {
        outcomes.reported.fetch_add(1, Ordering::Relaxed);
        warn!(
          worker,
          id = request.id,
          code = report.code,
          message = %report.message,
          "Reporting failure to requester"
        );
      }
    }
  }

  match Disposition::for_outcome(&outcome) {
    Disposition::Ack => queue.ack(delivery),
    Disposition::Requeue => {
      debug!(worker, id = delivery.item.id, attempt = delivery.attempt, "Requeueing request");
      queue.requeue(delivery);
    }
    Disposition::Leave => {
      debug!(worker, id = delivery.item.id, "Leaving request unacknowledged");
      queue.leave(delivery);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{HintStyle, SimulationConfig};
  use tokio::time::timeout;

  fn config(simulation: SimulationConfig) -> Config {
    Config {
      simulation,
      ..Config::default()
    }
  }

  #[tokio::test]
  async fn test_every_request_completes_behind_the_gate() {
    let config = config(SimulationConfig {
      workers: 3,
      requests: 6,
      burst: 3,
      period_ms: 300,
      latency_ms: 5,
      hint_style: HintStyle::Timestamp,
      failure_every: 0,
    });

    let summary = timeout(
      Duration::from_secs(10),
      simulate(&config, Arc::new(RateLimitGate::new()), CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.completed, 6);
    assert_eq!(summary.queue.acked, 6);
    assert_eq!(summary.reported, 0);
    assert_eq!(summary.outstanding, 0);
    assert!(summary.rejected >= 1, "the burst should have been exceeded");
  }

  #[tokio::test]
  async fn test_server_errors_are_requeued_and_retried() {
    let config = config(SimulationConfig {
      workers: 2,
      requests: 4,
      burst: 100,
      period_ms: 1_000,
      latency_ms: 1,
      hint_style: HintStyle::Seconds,
      failure_every: 3,
    });

    let summary = simulate(&config, Arc::new(RateLimitGate::new()), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(summary.completed, 4);
    assert!(summary.queue.requeued >= 1);
    assert_eq!(summary.reported, summary.queue.requeued);
    assert_eq!(summary.outstanding, 0);
  }

  #[tokio::test]
  async fn test_rejections_without_hint_are_acked_and_reported() {
    let config = config(SimulationConfig {
      workers: 2,
      requests: 5,
      burst: 2,
      period_ms: 60_000,
      latency_ms: 1,
      hint_style: HintStyle::None,
      failure_every: 0,
    });

    let summary = simulate(&config, Arc::new(RateLimitGate::new()), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.reported, 3);
    assert_eq!(summary.queue.acked, 5);
    assert_eq!(summary.queue.requeued, 0);
  }

  #[tokio::test]
  async fn test_shutdown_leaves_waiting_requests() {
    let config = config(SimulationConfig {
      workers: 2,
      requests: 4,
      burst: 1,
      period_ms: 60_000,
      latency_ms: 1,
      hint_style: HintStyle::Seconds,
      failure_every: 0,
    });
    let gate = Arc::new(RateLimitGate::new());
    let cancel = CancellationToken::new();

    let run = tokio::spawn({
      let gate = Arc::clone(&gate);
      let cancel = cancel.clone();
      async move { simulate(&config, gate, cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    gate.shutdown();
    cancel.cancel();

    let summary = timeout(Duration::from_secs(2), run).await.unwrap().unwrap().unwrap();

    assert_eq!(summary.completed, 1);
    assert!(summary.queue.left >= 1, "interrupted waiters should leave their items");
    assert_eq!(summary.outstanding, 3);
    assert_eq!(summary.reported, 0);
  }

  #[tokio::test]
  async fn test_zero_workers_is_rejected() {
    let config = config(SimulationConfig {
      workers: 0,
      ..SimulationConfig::default()
    });

    let err = simulate(&config, Arc::new(RateLimitGate::new()), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(err.to_string().contains("workers"));
  }
}
