//! Timing behaviour of the convergence poller under paused time.

use std::time::Duration;

use chart_verifier_cluster::fakes::{ScriptedCluster, StalledCluster};
use chart_verifier_cluster::{
    ClusterError, ConvergencePoller, DeploymentStatus, WaitError, QUERY_STALLED,
};
use tokio::sync::watch;
use tokio::time::Instant;

fn never_cancelled() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Keep the sender alive for the whole test.
    std::mem::forget(tx);
    rx
}

/// Test: pending for the first two seconds, then ready, before a 3s deadline
#[tokio::test(start_paused = true)]
async fn test_converges_before_deadline() {
    let cluster = ScriptedCluster::new(vec![
        Ok(vec![DeploymentStatus::unavailable("web", 1)]),
        Ok(vec![DeploymentStatus::unavailable("web", 1)]),
        Ok(vec![DeploymentStatus::available("web", 1)]),
    ]);
    let start = Instant::now();
    let deadline = start + Duration::from_secs(3);
    let mut cancel = never_cancelled();

    let result = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await;

    assert!(result.is_ok(), "expected convergence, got {result:?}");
    assert_eq!(cluster.calls(), 3, "stops polling once everything is ready");
    assert!(Instant::now() < deadline);
    assert_eq!(Instant::now() - start, Duration::from_secs(2));
}

/// Test: ready on the first tick returns without sleeping
#[tokio::test(start_paused = true)]
async fn test_immediate_success_does_not_wait() {
    let cluster = ScriptedCluster::steady(vec![DeploymentStatus::available("web", 2)]);
    let start = Instant::now();
    let mut cancel = never_cancelled();

    ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", start + Duration::from_secs(5), &mut cancel)
        .await
        .expect("should succeed immediately");

    assert_eq!(Instant::now(), start);
    assert_eq!(cluster.calls(), 1);
}

/// Test: a query that always errors surfaces the last transient error
#[tokio::test(start_paused = true)]
async fn test_always_failing_query_reports_last_error() {
    let cluster = ScriptedCluster::failing("connection refused");
    let deadline = Instant::now() + Duration::from_secs(1);
    let mut cancel = never_cancelled();

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await
        .expect_err("should time out");

    match &err {
        WaitError::TimedOutRetrying {
            last_error,
            last_known_pending,
        } => {
            assert!(last_error.contains("connection refused"));
            assert!(last_known_pending.is_none());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("connection refused"));
    assert!(Instant::now() >= deadline);
}

/// Test: deployments that never become available are named at the deadline
#[tokio::test(start_paused = true)]
async fn test_unavailable_deployments_reported_at_deadline() {
    let cluster = ScriptedCluster::steady(vec![
        DeploymentStatus::available("db", 1),
        DeploymentStatus::unavailable("web", 1),
    ]);
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut cancel = never_cancelled();

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await
        .expect_err("should time out");

    assert_eq!(
        err,
        WaitError::TimedOutWaiting {
            pending: vec!["web".to_string()]
        }
    );
    assert_eq!(cluster.calls(), 3);
}

/// Test: a flaky query does not fail an otherwise successful wait
#[tokio::test(start_paused = true)]
async fn test_transient_error_then_success() {
    let cluster = ScriptedCluster::new(vec![
        Err(ClusterError::Request("etcd leader changed".to_string())),
        Ok(vec![DeploymentStatus::available("web", 1)]),
    ]);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut cancel = never_cancelled();

    ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await
        .expect("transient error should be retried");

    assert_eq!(cluster.calls(), 2);
}

/// Test: a failure after earlier progress still names the last known pending set
#[tokio::test(start_paused = true)]
async fn test_error_at_deadline_keeps_last_known_pending() {
    let cluster = ScriptedCluster::new(vec![
        Ok(vec![DeploymentStatus::unavailable("web", 1)]),
        Err(ClusterError::Request("timeout".to_string())),
    ]);
    let deadline = Instant::now() + Duration::from_secs(1);
    let mut cancel = never_cancelled();

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await
        .expect_err("should time out");

    assert_eq!(
        err,
        WaitError::TimedOutRetrying {
            last_error: "error getting deployments from namespace ns: cluster request failed: timeout"
                .to_string(),
            last_known_pending: Some(vec!["web".to_string()]),
        }
    );
}

/// Test: cancellation unblocks the poller before its deadline
#[tokio::test(start_paused = true)]
async fn test_cancellation_unblocks_wait() {
    let cluster = ScriptedCluster::steady(vec![DeploymentStatus::unavailable("web", 1)]);
    let start = Instant::now();
    let deadline = start + Duration::from_secs(60);
    let (tx, mut rx) = watch::channel(false);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let _ = tx.send(true);
        tx
    });

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut rx)
        .await
        .expect_err("should be cancelled");

    assert_eq!(err, WaitError::Cancelled);
    assert!(Instant::now() - start < Duration::from_secs(3));
    let _ = canceller.await;
}

/// Test: a custom interval controls the tick spacing
#[tokio::test(start_paused = true)]
async fn test_custom_interval() {
    let cluster = ScriptedCluster::steady(vec![DeploymentStatus::unavailable("web", 1)]);
    let deadline = Instant::now() + Duration::from_secs(1);
    let mut cancel = never_cancelled();

    let _ = ConvergencePoller::new(&cluster)
        .with_interval(Duration::from_millis(250))
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await;

    assert_eq!(cluster.calls(), 5);
}

/// Test: a query that never answers is abandoned at the deadline
#[tokio::test(start_paused = true)]
async fn test_stalled_query_times_out_at_deadline() {
    let cluster = StalledCluster::new();
    let start = Instant::now();
    let deadline = start + Duration::from_secs(1);
    let mut cancel = never_cancelled();

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut cancel)
        .await
        .expect_err("should time out");

    assert_eq!(
        err,
        WaitError::TimedOutRetrying {
            last_error: format!("error getting deployments from namespace ns: {QUERY_STALLED}"),
            last_known_pending: None,
        }
    );
    assert_eq!(Instant::now() - start, Duration::from_secs(1));
    assert_eq!(cluster.calls(), 1);
}

/// Test: cancellation interrupts a query that is still in flight
#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_stalled_query() {
    let cluster = StalledCluster::new();
    let start = Instant::now();
    let deadline = start + Duration::from_secs(60);
    let (tx, mut rx) = watch::channel(false);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = tx.send(true);
        tx
    });

    let err = ConvergencePoller::new(&cluster)
        .wait_for_deployments("ns", "app=web", deadline, &mut rx)
        .await
        .expect_err("should be cancelled");

    assert_eq!(err, WaitError::Cancelled);
    assert!(Instant::now() - start < Duration::from_secs(3));
    let _ = canceller.await;
}
