//! End-to-end job scenarios against an in-process fleet and in-memory storage.

mod common;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use common::*;
use renderfleet_core::download::DownloadBehavior;
use renderfleet_core::fleet::FailureKind;
use renderfleet_core::models::{Codec, FailureReason, JobId, JobSpec, Region};
use renderfleet_core::orchestration::{
    JobOrchestrator, JobStatusReport, StaticCompositionResolver,
};
use renderfleet_core::storage::{keys, BucketHandle};
use renderfleet_core::{JobState, RenderError};

fn spec(job_id: &str, frames: i64, chunk_size: i64) -> JobSpec {
    JobSpec::new(TEST_COMPOSITION, frames, chunk_size, Codec::H264).with_job_id(job_id)
}

async fn bucket(harness: &TestHarness) -> BucketHandle {
    harness
        .storage
        .find_bucket(&Region::new(TEST_REGION))
        .await
        .unwrap()
        .expect("render bucket exists")
}

/// Poll an async condition until it holds or two seconds pass
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "{what} not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn segment_count(harness: &TestHarness, job_id: &JobId) -> usize {
    bucket(harness)
        .await
        .list(&keys::chunk_prefix(job_id))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_job_renders_and_stitches_in_order() {
    let harness = HarnessBuilder::new().build().await;
    let job_id = harness
        .orchestrator
        .submit(spec("scenario-a", 100, 30), &harness.fleet)
        .await
        .unwrap();

    let report = harness.wait(&job_id).await;
    assert_eq!(report.status, JobState::Done);
    assert_eq!(report.total_count, 4);
    assert_eq!(report.rendered_count, 4);
    assert_eq!(report.pending_count, 0);
    assert_eq!(report.percent, 100.0);
    assert_eq!(report.invocations, 4);
    assert!(report.failure_reason.is_none());
    assert!(report.estimated_cost.is_some());

    let output_key = report.output_key.expect("output key recorded");
    assert_eq!(output_key, keys::output_key(&job_id));
    let bucket = bucket(&harness).await;
    let artifact = bucket.get(&output_key).await.unwrap();
    assert_eq!(&artifact[..], b"[0][1][2][3]");
    assert_eq!(report.output_size, Some(artifact.len() as u64));

    // Segments are cleaned up once the artifact is written
    assert!(bucket
        .list(&keys::chunk_prefix(&job_id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_out_of_order_completion_still_stitches_by_index() {
    let harness = HarnessBuilder::new()
        .with_worker(|worker| {
            worker
                .script(0, vec![MockStep::Sleep(Duration::from_millis(40))])
                .script(1, vec![MockStep::Sleep(Duration::from_millis(30))])
                .script(2, vec![MockStep::Sleep(Duration::from_millis(20))])
        })
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("reverse-order", 100, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Done);
    let artifact = bucket(&harness)
        .await
        .get(&keys::output_key(&job_id))
        .await
        .unwrap();
    assert_eq!(&artifact[..], b"[0][1][2][3]");
}

#[tokio::test]
async fn test_permanent_failure_fails_job_without_retry() {
    let harness = HarnessBuilder::new()
        .with_worker(|worker| {
            worker.script(2, vec![MockStep::Permanent(FailureKind::MalformedInput)])
        })
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("scenario-b", 100, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Failed);
    match report.failure_reason {
        Some(FailureReason::ChunkFailed { chunk_index, .. }) => assert_eq!(chunk_index, 2),
        other => panic!("expected chunk failure, got {other:?}"),
    }
    assert_eq!(harness.worker.attempts_for(2), 1);
    assert!(report.output_key.is_none());

    // Nothing else is dispatched after the job fails
    let invoked = harness.worker.invocations().len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.worker.invocations().len(), invoked);

    // Attempts still running at the failure are billed, then their segments go
    eventually("every attempt audited", || async {
        harness.orchestrator.tracker().invocation_log(&job_id).unwrap().len() == invoked
    })
    .await;
    eventually("segments removed", || async {
        segment_count(&harness, &job_id).await == 0
    })
    .await;
    let report = harness.orchestrator.status(&job_id).await.unwrap();
    assert_eq!(report.invocations, invoked as u64);
}

#[tokio::test]
async fn test_transient_timeouts_are_retried_until_success() {
    let harness = HarnessBuilder::new()
        .with_worker(|worker| {
            worker.script(
                1,
                vec![
                    MockStep::Sleep(Duration::from_millis(400)),
                    MockStep::Sleep(Duration::from_millis(400)),
                ],
            )
        })
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("scenario-c", 100, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Done);
    assert_eq!(harness.worker.attempts_for(1), 3);
    let attempts: Vec<u32> = harness
        .worker
        .invocations()
        .into_iter()
        .filter(|i| i.chunk_index == 1)
        .map(|i| i.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let log = harness.orchestrator.tracker().invocation_log(&job_id).unwrap();
    let chunk_one: Vec<&str> = log
        .iter()
        .filter(|record| record.chunk_index == 1)
        .map(|record| record.outcome.as_str())
        .collect();
    assert_eq!(chunk_one, vec!["transient", "transient", "success"]);
    assert_eq!(report.invocations, 6);
}

#[tokio::test]
async fn test_retries_exhausted_fails_job() {
    let harness = HarnessBuilder::new()
        .with_config(|config| config.dispatch.max_retries = 2)
        .with_worker(|worker| {
            worker.script(0, vec![MockStep::Transient(FailureKind::Throttled); 5])
        })
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("exhausted", 60, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Failed);
    assert!(matches!(
        report.failure_reason,
        Some(FailureReason::RetriesExhausted {
            chunk_index: 0,
            attempts: 3,
            ..
        })
    ));
    assert_eq!(harness.worker.attempts_for(0), 3);
}

#[tokio::test]
async fn test_cancel_discards_in_flight_results() {
    let gate = Arc::new(Semaphore::new(0));
    let worker_gate = Arc::clone(&gate);
    let harness = HarnessBuilder::new()
        .with_config(|config| config.timeouts.invocation_timeout_ms = 5_000)
        .with_worker(move |worker| worker.with_gate(worker_gate))
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(
            spec("scenario-d", 100, 30).with_max_concurrency(2),
            &harness.fleet,
        )
        .await
        .unwrap();
    harness.wait_until(|| harness.worker.in_flight() == 2).await;

    let report = harness.orchestrator.cancel(&job_id).await.unwrap();
    assert_eq!(report.status, JobState::Failed);
    assert_eq!(report.failure_reason, Some(FailureReason::Cancelled));

    // Let the in-flight workers finish; their results must not count
    gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = harness.orchestrator.status(&job_id).await.unwrap();
    assert_eq!(report.status, JobState::Failed);
    assert_eq!(report.rendered_count, 0);
    assert_eq!(harness.worker.invocations().len(), 2);

    // Both attempts are still billed, and what they wrote is cleaned up
    eventually("in-flight attempts audited", || async {
        harness.orchestrator.status(&job_id).await.unwrap().invocations == 2
    })
    .await;
    eventually("segments removed", || async {
        segment_count(&harness, &job_id).await == 0
    })
    .await;
    assert!(report.output_key.is_none());

    let again = harness.orchestrator.cancel(&job_id).await;
    assert!(matches!(again, Err(RenderError::InvalidState(_))));
}

#[tokio::test]
async fn test_job_timeout_moves_job_to_timed_out() {
    let gate = Arc::new(Semaphore::new(0));
    let worker_gate = Arc::clone(&gate);
    let harness = HarnessBuilder::new()
        .with_config(|config| config.timeouts.invocation_timeout_ms = 5_000)
        .with_worker(move |worker| worker.with_gate(worker_gate))
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("slow-job", 60, 30).with_timeout_seconds(1), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::TimedOut);
    assert!(report.failure_reason.is_none());
    assert!(report.output_key.is_none());
    assert_eq!(harness.fleet_manager.active_leases(harness.fleet.revision_id()), 0);
    gate.close();
}

#[tokio::test]
async fn test_dispatch_respects_max_concurrency() {
    let harness = HarnessBuilder::new()
        .with_worker(|worker| worker.with_render_delay(Duration::from_millis(10)))
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("bounded", 200, 10).with_max_concurrency(3), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Done);
    assert_eq!(report.total_count, 20);
    assert!(harness.worker.max_in_flight() <= 3);
    assert!(harness.worker.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_revision_in_use_until_job_finishes() {
    let gate = Arc::new(Semaphore::new(0));
    let worker_gate = Arc::clone(&gate);
    let harness = HarnessBuilder::new()
        .with_config(|config| config.timeouts.invocation_timeout_ms = 5_000)
        .with_worker(move |worker| worker.with_gate(worker_gate))
        .build()
        .await;
    let revision_id = harness.fleet.revision_id().to_string();

    let job_id = harness
        .orchestrator
        .submit(spec("lease-holder", 30, 30), &harness.fleet)
        .await
        .unwrap();

    let err = harness.fleet_manager.delete(&revision_id).await.unwrap_err();
    assert!(matches!(err, RenderError::RevisionInUse { active_jobs: 1, .. }));

    gate.add_permits(1);
    let report = harness.wait(&job_id).await;
    assert_eq!(report.status, JobState::Done);

    harness.fleet_manager.delete(&revision_id).await.unwrap();
    assert!(harness.fleet_manager.get_info(&revision_id).is_err());
}

#[tokio::test]
async fn test_download_behavior_sets_content_disposition() {
    let harness = HarnessBuilder::new().build().await;
    let job_id = harness
        .orchestrator
        .submit(
            spec("download-me", 30, 10).with_download(DownloadBehavior::Download {
                file_name: Some("final cut.mp4".to_string()),
            }),
            &harness.fleet,
        )
        .await
        .unwrap();
    harness.wait(&job_id).await;

    let meta = bucket(&harness)
        .await
        .head(&keys::output_key(&job_id))
        .await
        .unwrap()
        .expect("output exists");
    assert_eq!(
        meta.attributes.content_disposition.as_deref(),
        Some("attachment; filename=\"final%20cut.mp4\"")
    );
    assert_eq!(meta.attributes.content_type.as_deref(), Some("video/mp4"));
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected_before_side_effects() {
    let harness = HarnessBuilder::new().build().await;
    let orchestrator = &harness.orchestrator;

    let cases = [
        spec("zero-frames", 0, 30),
        spec("zero-chunk", 100, 0),
        spec("too-many-frames", 20_000, 30),
        JobSpec::new("missing-composition", 100, 30, Codec::H264),
        spec("wrong-region", 100, 30).with_region("eu-west-1"),
        spec("bad id!", 100, 30),
    ];
    for case in cases {
        let result = orchestrator.submit(case.clone(), &harness.fleet).await;
        assert!(
            matches!(result, Err(RenderError::InvalidSpec(_))),
            "{case:?} should be rejected, got {result:?}"
        );
    }

    assert!(orchestrator.job_ids().is_empty());
    assert_eq!(harness.backend.object_count(), 0);
    assert_eq!(harness.fleet_manager.active_leases(harness.fleet.revision_id()), 0);
}

#[tokio::test]
async fn test_duplicate_job_id_rejected() {
    let harness = HarnessBuilder::new().build().await;
    harness
        .orchestrator
        .submit(spec("only-once", 30, 30), &harness.fleet)
        .await
        .unwrap();

    let second = harness
        .orchestrator
        .submit(spec("only-once", 30, 30), &harness.fleet)
        .await;
    assert!(matches!(second, Err(RenderError::InvalidSpec(_))));
}

#[tokio::test]
async fn test_generated_job_id_and_open_ended_composition() {
    let harness = HarnessBuilder::new().build().await;
    let job_id = harness
        .orchestrator
        .submit(
            JobSpec::new("open-ended", 50_000, 10_000, Codec::Vp9),
            &harness.fleet,
        )
        .await
        .unwrap();

    assert_eq!(job_id.as_str().len(), 12);
    let report = harness.wait(&job_id).await;
    assert_eq!(report.status, JobState::Done);
    assert_eq!(report.total_count, 5);
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let harness = HarnessBuilder::new().build().await;
    let mut events = harness.orchestrator.events().subscribe();

    let job_id = harness
        .orchestrator
        .submit(spec("evented", 60, 30), &harness.fleet)
        .await
        .unwrap();
    harness.wait(&job_id).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut job_events = Vec::new();
    let mut rendered = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id, job_id.as_str());
        if event.name.starts_with("job.") {
            job_events.push(event.name);
        } else if event.name == "chunk.rendered" {
            rendered += 1;
        }
    }
    assert_eq!(
        job_events,
        vec!["job.submitted", "job.started", "job.stitching", "job.completed"]
    );
    assert_eq!(rendered, 2);
}

#[tokio::test]
async fn test_status_falls_back_to_checkpoint() {
    let harness = HarnessBuilder::new().build().await;
    let job_id = harness
        .orchestrator
        .submit(spec("checkpointed", 60, 30), &harness.fleet)
        .await
        .unwrap();
    harness.wait(&job_id).await;

    // A fresh orchestrator over the same storage has no in-memory record
    let fresh = JobOrchestrator::builder(
        test_config(),
        Arc::clone(&harness.storage),
        Arc::new(StaticCompositionResolver::new()),
    )
    .build();

    let mut report = fresh.status(&job_id).await.unwrap();
    for _ in 0..100 {
        if report.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        report = fresh.status(&job_id).await.unwrap();
    }
    assert_eq!(report.status, JobState::Done);
    assert_eq!(report.rendered_count, 2);

    assert!(matches!(
        fresh.cancel(&job_id).await,
        Err(RenderError::InvalidState(_))
    ));
    let unknown = JobId::parse("never-submitted").unwrap();
    assert!(matches!(
        fresh.status(&unknown).await,
        Err(RenderError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_transient_stitch_reads_are_retried() {
    let builder = HarnessBuilder::new();
    let flaky = Arc::new(FlakyBackend::new(builder.memory(), "/chunk/", 2));
    let harness = builder.with_storage(flaky.clone()).build().await;

    let job_id = harness
        .orchestrator
        .submit(spec("flaky-stitch", 100, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Done);
    assert_eq!(flaky.injected_failures(), 2);
    let artifact = bucket(&harness)
        .await
        .get(&keys::output_key(&job_id))
        .await
        .unwrap();
    assert_eq!(&artifact[..], b"[0][1][2][3]");
}

#[tokio::test]
async fn test_stitch_failure_after_all_attempts() {
    let builder = HarnessBuilder::new().with_config(|config| config.stitch.max_attempts = 3);
    let flaky = Arc::new(FlakyBackend::new(builder.memory(), "/chunk/", 1_000));
    let harness = builder.with_storage(flaky.clone()).build().await;

    let job_id = harness
        .orchestrator
        .submit(spec("doomed-stitch", 60, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;

    assert_eq!(report.status, JobState::Failed);
    assert!(matches!(
        report.failure_reason,
        Some(FailureReason::StitchFailure { attempts: 3, .. })
    ));
    assert_eq!(report.rendered_count, 2);
    assert!(report.output_key.is_none());
}

#[tokio::test]
async fn test_finished_job_is_evicted_and_served_from_checkpoint() {
    let harness = HarnessBuilder::new()
        .with_config(|config| config.progress.retain_terminal_seconds = 0)
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("short-lived", 100, 30), &harness.fleet)
        .await
        .unwrap();
    harness.wait(&job_id).await;

    harness
        .wait_until(|| harness.orchestrator.job_ids().is_empty())
        .await;
    assert!(!harness.orchestrator.tracker().contains(&job_id));

    let report = harness.orchestrator.status(&job_id).await.unwrap();
    assert_eq!(report.status, JobState::Done);
    assert_eq!(report.rendered_count, 4);
    assert_eq!(report.total_count, 4);
    assert_eq!(report.invocations, 4);
    assert_eq!(report.percent, 100.0);
    assert!(report.output_key.is_some());

    // The id stays taken after eviction
    let again = harness
        .orchestrator
        .submit(spec("short-lived", 100, 30), &harness.fleet)
        .await;
    assert!(matches!(again, Err(RenderError::InvalidSpec(_))));
}

#[tokio::test]
async fn test_second_orchestrator_reads_chunk_progress_mid_job() {
    let gate = Arc::new(Semaphore::new(2));
    let worker_gate = Arc::clone(&gate);
    let harness = HarnessBuilder::new()
        .with_config(|config| config.timeouts.invocation_timeout_ms = 5_000)
        .with_worker(move |worker| worker.with_gate(worker_gate))
        .build()
        .await;

    let job_id = harness
        .orchestrator
        .submit(spec("shared-progress", 100, 30), &harness.fleet)
        .await
        .unwrap();

    let fresh = JobOrchestrator::builder(
        test_config(),
        Arc::clone(&harness.storage),
        Arc::new(StaticCompositionResolver::new()),
    )
    .build();

    eventually("two chunks visible from storage", || async {
        let report = fresh.status(&job_id).await.unwrap();
        report.status == JobState::InProgress && report.rendered_count == 2
    })
    .await;
    let report = fresh.status(&job_id).await.unwrap();
    assert_eq!(report.status, JobState::InProgress);
    assert_eq!(report.total_count, 4);
    assert_eq!(report.pending_count, 2);
    assert_eq!(report.invocations, 2);
    assert_eq!(report.percent, 50.0);

    gate.add_permits(10);
    let report = harness.wait(&job_id).await;
    assert_eq!(report.status, JobState::Done);
    eventually("final counts visible from storage", || async {
        let report = fresh.status(&job_id).await.unwrap();
        report.status == JobState::Done && report.rendered_count == 4
    })
    .await;
}

#[tokio::test]
async fn test_slow_checkpoint_write_does_not_overwrite_final_status() {
    let builder = HarnessBuilder::new();
    // The first write (pending) is prompt; the second (in progress) lands late
    let slow = Arc::new(
        FlakyBackend::new(builder.memory(), "/chunk/", 0).with_put_delays(
            "status.json",
            vec![Duration::ZERO, Duration::from_millis(80)],
        ),
    );
    let harness = builder.with_storage(slow).build().await;

    let job_id = harness
        .orchestrator
        .submit(spec("ordered-checkpoints", 60, 30), &harness.fleet)
        .await
        .unwrap();
    let report = harness.wait(&job_id).await;
    assert_eq!(report.status, JobState::Done);

    let status_key = keys::status_key(&job_id);
    let render_bucket = bucket(&harness).await;
    eventually("terminal checkpoint", || async {
        match render_bucket.get(&status_key).await {
            Ok(body) => {
                let stored: JobStatusReport = serde_json::from_slice(&body).unwrap();
                stored.status == JobState::Done
            }
            Err(_) => false,
        }
    })
    .await;

    // No queued write lands after the terminal one
    tokio::time::sleep(Duration::from_millis(120)).await;
    let body = render_bucket.get(&status_key).await.unwrap();
    let stored: JobStatusReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(stored.status, JobState::Done);
}
