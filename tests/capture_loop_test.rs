//! Capture loop against a real hub: stops when the faculty ends the session

use classroom_pulse::capture::{
    CaptureConfig, CaptureController, CapturePhase, StopReason, SyntheticCamera,
    NOTICE_CLASS_ENDED,
};
use classroom_pulse::core::{HintClassifier, HubConfig, SessionHub};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn hub() -> Arc<SessionHub> {
    Arc::new(SessionHub::new(Arc::new(HintClassifier), HubConfig::default()))
}

fn fast_config(session_id: u64, student_id: u64) -> CaptureConfig {
    CaptureConfig {
        interval: Duration::from_millis(20),
        submit_timeout: Duration::from_millis(500),
        ..CaptureConfig::new(session_id, student_id)
    }
}

#[tokio::test]
async fn test_loop_stops_when_session_ends() {
    let hub = hub();
    let started = hub.start_instant(7, "Sorting").await.unwrap();

    let camera = SyntheticCamera::with_hints(vec!["happy".to_string()]);
    let open = camera.open_flag();
    let frames = camera.frame_counter();

    let mut controller = CaptureController::new(fast_config(started.session_id, 42));
    controller.join(camera, hub.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = hub.snapshot(started.session_id).await.unwrap();
    assert_eq!(snapshot.total_active, 1);

    hub.end_session(started.session_id).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(2), controller.stopped())
        .await
        .unwrap();
    assert_eq!(reason, StopReason::SessionEnded);
    assert!(!open.load(Ordering::SeqCst));

    // No more frames once stopped
    let captured = frames.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(frames.load(Ordering::SeqCst), captured);

    let status = controller.status();
    assert_eq!(status.phase, CapturePhase::Stopped(StopReason::SessionEnded));
    assert_eq!(status.notice.as_deref(), Some(NOTICE_CLASS_ENDED));
    assert!(status.sample_count >= 1);
}

#[tokio::test]
async fn test_many_students_share_one_aggregate() {
    let hub = hub();
    let started = hub.start_instant(1, "Hashing").await.unwrap();

    let mut controllers = Vec::new();
    for student in 0..8u64 {
        let mut controller = CaptureController::new(fast_config(started.session_id, student));
        controller.join(SyntheticCamera::new(), hub.clone()).unwrap();
        controllers.push(controller);
    }

    tokio::time::sleep(Duration::from_millis(120)).await;
    hub.end_session(started.session_id).await.unwrap();

    for controller in &controllers {
        let reason = tokio::time::timeout(Duration::from_secs(2), controller.stopped())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::SessionEnded);
    }

    let snapshot = hub.snapshot(started.session_id).await.unwrap();
    assert_eq!(snapshot.total_active, 8);
    let summary = hub.summary(started.session_id).await.unwrap();
    assert_eq!(summary.students.len(), 8);
}

#[cfg(all(feature = "server", feature = "client"))]
mod over_http {
    use super::*;
    use classroom_pulse::client::{ClientConfig, SessionClient};
    use classroom_pulse::server::{run, ServerConfig};

    #[tokio::test]
    async fn test_http_client_loop_stops_on_end() {
        let hub = hub();
        let (addr, shutdown_tx) = run(ServerConfig::new(0, HubConfig::default()), hub.clone())
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = SessionClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap();
        let started = client.start_instant(4, "Queues").await.unwrap();

        let mut controller = CaptureController::new(fast_config(started.session_id, 77));
        controller
            .join(SyntheticCamera::new(), client.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        client.end_session(started.session_id).await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(3), controller.stopped())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::SessionEnded);
        assert!(controller.stats().stats().samples_accepted >= 1);

        let _ = shutdown_tx.send(());
    }
}
