use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::engine::Scheduler;

/// Background task that periodically re-examines the waiting list.
pub async fn run_reconciler(scheduler: Arc<Scheduler>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let started = std::time::Instant::now();
        let committed = scheduler.reconcile_pass().await;
        metrics::histogram!(crate::observability::RECONCILE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if committed > 0 {
            info!("reconciled {committed} waiting requests");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainConfig;
    use crate::engine::{Admission, NewRequest, SchedulerSettings};
    use crate::model::*;
    use crate::notify::{DeliveryError, Notifier};
    use crate::send_home::AdmitAll;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("stagegate_test_reconcile");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    struct Forward(mpsc::UnboundedSender<(String, Reply)>);

    #[async_trait]
    impl Notifier for Forward {
        async fn deliver(&self, url: &str, reply: &Reply) -> Result<(), DeliveryError> {
            let _ = self.0.send((url.to_string(), reply.clone()));
            Ok(())
        }
    }

    fn request(id: i64, stage: &str, arrival: Minutes, callback: Option<&str>) -> NewRequest {
        NewRequest {
            entity: Some(id),
            stage: stage.into(),
            arrival,
            duration: 30,
            metadata: Metadata::new("A1"),
            callback: callback.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn reconciler_delivers_deferred_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(
            Scheduler::new(
                test_wal_path("reconciler_delivers.wal"),
                DomainConfig::healthcare(),
                SchedulerSettings::default(),
                Arc::new(Forward(tx)),
                Arc::new(AdmitAll),
            )
            .unwrap(),
        );

        // Monday 09:00 admission, then intake for entity 1 before entity 2 shows up.
        let t = 9 * MINUTES_PER_HOUR;
        scheduler.submit(request(1, "Admission", t, None)).await.unwrap();
        let deferred = scheduler
            .submit(request(1, "Intake", t + 20, Some("http://cb/1")))
            .await
            .unwrap();
        assert!(matches!(deferred, Admission::Deferred(_)));

        // A later arrival moves the watermark past the intake request.
        scheduler.submit(request(2, "Admission", t + 60, None)).await.unwrap();

        tokio::spawn(run_reconciler(scheduler.clone(), Duration::from_millis(10)));
        let (url, reply) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url, "http://cb/1");
        assert_eq!(reply.entity(), 1);
        assert_eq!(scheduler.status().await.waiting, 0);
    }
}
