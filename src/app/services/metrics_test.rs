use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;
use crate::backend::MockBackend;
use crate::models::SystemMetrics;

#[tokio::test]
async fn test_poller_emits_metrics_and_skips_failures() {
    let mut backend = MockBackend::new();
    let mut seq = mockall::Sequence::new();
    backend
        .expect_metrics()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Box::pin(async { Err(eyre::eyre!("psutil missing")) }));
    backend
        .expect_metrics()
        .in_sequence(&mut seq)
        .returning(|| {
            Box::pin(async {
                Ok(SystemMetrics {
                    cpu_percent: 12.5,
                    memory_percent: 40.0,
                    ..Default::default()
                })
            })
        });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let poller = MetricsPoller::new(
        Arc::new(backend),
        Arc::new(tx),
        Duration::from_millis(10),
        token.clone(),
    );
    let handle = tokio::spawn(poller.start());

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("metrics in time")
        .expect("channel open");
    match event {
        Event::Metrics(metrics) => {
            assert_eq!(metrics.cpu_percent, 12.5);
            assert_eq!(metrics.to_string(), "CPU: 12.5%, Memory: 40.0%");
        }
        other => panic!("unexpected event {:?}", other),
    }

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller stopped")
        .expect("join");
}
