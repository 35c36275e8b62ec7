//! End-to-end lifecycle checks against the synthetic host.

use std::sync::Arc;
use std::time::Duration;

use screenrec_audio_mixer::analysis::{channel, tone_level};
use screenrec_capture_engine::{
    CollectingSink, EndOutcome, Notice, ScreenRecorder, SessionState,
};
use screenrec_common::{RecorderError, RecordingDefaults, RecordingOptions};
use screenrec_platform_core::{MediaData, TrackKind};
use screenrec_platform_synthetic::patterns::{CAMERA_COLOR, MIC_TONE_HZ, SCREEN_BLUE, TAB_TONE_HZ};
use screenrec_platform_synthetic::recorder::EBML_MAGIC;
use screenrec_platform_synthetic::{Grant, SyntheticHost};
use screenrec_render_engine::InsetLayout;

fn defaults() -> RecordingDefaults {
    RecordingDefaults {
        chunk_interval_ms: 100,
        ..RecordingDefaults::default()
    }
}

fn recorder(host: &SyntheticHost, sink: &Arc<CollectingSink>) -> ScreenRecorder {
    ScreenRecorder::new(Arc::new(host.clone()), sink.clone(), defaults())
}

fn all_sources() -> RecordingOptions {
    RecordingOptions {
        enable_mic: true,
        enable_audio: true,
        enable_screen: true,
        enable_camera: true,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn every_option_combination_starts_or_rejects_cleanly() {
    for options in RecordingOptions::all_combinations() {
        let host = SyntheticHost::builder().screen_size(160, 90).build();
        let sink = Arc::new(CollectingSink::new());
        let recorder = recorder(&host, &sink);

        match recorder.start(options).await {
            Ok(handle) => {
                assert!(options.requests_display(), "{options:?}");
                assert_eq!(handle.state(), SessionState::Recording);
                tokio::time::sleep(Duration::from_millis(50)).await;

                let outcome = handle.end().await;
                assert!(matches!(outcome, EndOutcome::Saved { .. }), "{options:?}: {outcome}");
                assert_eq!(handle.state(), SessionState::Stopped);
            }
            Err(e) => {
                assert!(!options.requests_display(), "{options:?}: {e}");
                assert!(matches!(e, RecorderError::Capture { .. }));
                assert_eq!(host.issued_tracks(), 0);
            }
        }
        assert_eq!(host.live_tracks(), 0, "{options:?}");
        assert!(!recorder.is_active());
    }
}

#[tokio::test]
async fn display_denial_rejects_start_without_allocating() {
    let host = SyntheticHost::builder().display(Grant::Deny).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let err = recorder.start(all_sources()).await.unwrap_err();
    assert!(matches!(err, RecorderError::PermissionDenied { .. }));
    assert_eq!(host.requests(), vec!["display"]);
    assert_eq!(host.issued_tracks(), 0);
    assert_eq!(host.recorders_created(), 0);
    assert!(!recorder.is_active());
}

#[tokio::test]
async fn concurrent_end_delivers_once() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(RecordingOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let other = handle.clone();
    let (a, b) = tokio::join!(handle.end(), other.end());
    assert_eq!(a, b);
    assert!(matches!(a, EndOutcome::Saved { .. }));
    assert_eq!(sink.files().len(), 1);
    assert!(sink.notices().is_empty());

    // Later calls see the same outcome and deliver nothing new.
    assert_eq!(handle.end().await, a);
    assert_eq!(sink.files().len(), 1);
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn stop_sharing_ends_the_session_once() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(RecordingOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(host.end_screen_share() > 0);
    let outcome = handle.finished().await;
    assert!(matches!(outcome, EndOutcome::Saved { .. }));

    // The caller ending afterwards is harmless.
    assert_eq!(handle.end().await, outcome);
    assert_eq!(sink.files().len(), 1);
    assert_eq!(host.live_tracks(), 0);
    assert!(!recorder.is_active());
}

#[tokio::test]
async fn both_triggers_produce_the_same_kind_of_file() {
    let mut files = Vec::new();
    for host_ends in [false, true] {
        let host = SyntheticHost::builder().screen_size(160, 90).build();
        let sink = Arc::new(CollectingSink::new());
        let recorder = recorder(&host, &sink);

        let handle = recorder.start(RecordingOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        if host_ends {
            host.end_screen_share();
            handle.finished().await;
        } else {
            handle.end().await;
        }
        files.extend(sink.files());
    }

    assert_eq!(files.len(), 2);
    for file in &files {
        assert_eq!(file.mime_type, "video/webm");
        assert!(file.filename.starts_with("local-screen-recorder-"));
        assert!(file.filename.ends_with(".webm"));
        assert_eq!(&file.bytes[..4], &EBML_MAGIC);
        // Both video and audio records made it into the file.
        assert!(file.bytes.len() > 4 + 13 * 4);
    }
}

#[tokio::test]
async fn nothing_recorded_is_too_short() {
    let host = SyntheticHost::builder().idle().build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = ScreenRecorder::new(
        Arc::new(host.clone()),
        sink.clone(),
        RecordingDefaults {
            chunk_interval_ms: 60_000,
            ..RecordingDefaults::default()
        },
    );

    let handle = recorder
        .start(RecordingOptions {
            enable_mic: false,
            enable_audio: false,
            enable_screen: true,
            enable_camera: false,
        })
        .await
        .unwrap();
    let outcome = handle.end().await;

    assert_eq!(outcome, EndOutcome::TooShort);
    assert_eq!(sink.notices(), vec![Notice::TooShort]);
    assert!(sink.files().is_empty());
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn camera_inset_stays_inside_its_circle() {
    let host = SyntheticHost::builder()
        .screen_size(320, 180)
        .camera_size(64, 48)
        .build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(all_sources()).await.unwrap();
    let video = handle.output_stream().first_video().unwrap().clone();
    assert_eq!(video.label(), "composite");

    let mut frames = video.subscribe();
    let frame = loop {
        match tokio::time::timeout(Duration::from_secs(5), frames.recv()).await {
            Ok(Ok(MediaData::Video(frame))) => break frame,
            Ok(Ok(MediaData::Audio(_))) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            other => panic!("no composite frame: {other:?}"),
        }
    };
    handle.end().await;

    assert_eq!((frame.width(), frame.height()), (320, 180));
    let layout = InsetLayout::for_surface(320, 180);
    let r = layout.radius();
    for y in 0..180 {
        for x in 0..320 {
            let pixel = *frame.image.get_pixel(x, y);
            let d = layout.distance(x as f64 + 0.5, y as f64 + 0.5);
            if d > r + 2.0 {
                assert_eq!(pixel.0[2], SCREEN_BLUE, "({x},{y}) outside the inset");
            } else if d < r - 2.0 {
                assert_eq!(pixel, CAMERA_COLOR, "({x},{y}) inside the inset");
            }
        }
    }
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn mixed_audio_carries_both_sources() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder
        .start(RecordingOptions {
            enable_mic: true,
            enable_audio: true,
            enable_screen: false,
            enable_camera: false,
        })
        .await
        .unwrap();
    let audio = handle.output_stream().first_audio().unwrap().clone();
    assert_eq!(audio.label(), "mixed-audio");
    assert_eq!(audio.kind(), TrackKind::Audio);

    let mut rx = audio.subscribe();
    let mut left = Vec::new();
    // Skip the first quanta while both sources warm up.
    let mut seen = 0;
    while left.len() < 24_000 {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(MediaData::Audio(chunk))) => {
                seen += 1;
                if seen > 5 {
                    left.extend(channel(&chunk.samples, chunk.channels, 0));
                }
            }
            Ok(Ok(MediaData::Video(_))) => {}
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => {}
            other => panic!("mixed audio stopped: {other:?}"),
        }
    }
    handle.end().await;

    let tab = tone_level(&left, 48000, TAB_TONE_HZ);
    let mic = tone_level(&left, 48000, MIC_TONE_HZ);
    assert!(tab > 0.05, "tab tone level {tab}");
    assert!(mic > 0.05, "mic tone level {mic}");
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn denied_optional_sources_still_record() {
    let host = SyntheticHost::builder()
        .screen_size(160, 90)
        .microphone(Grant::Deny)
        .camera(Grant::Deny)
        .build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(all_sources()).await.unwrap();
    let stream = handle.output_stream();
    assert_eq!(stream.first_video().unwrap().label(), "screen");
    assert_eq!(stream.first_audio().unwrap().label(), "mixed-audio");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(handle.end().await, EndOutcome::Saved { .. }));
    assert_eq!(host.requests(), vec!["display", "camera", "microphone"]);
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn second_start_is_rejected_until_teardown() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(RecordingOptions::default()).await.unwrap();
    assert!(recorder.is_active());
    let err = recorder.start(RecordingOptions::default()).await.unwrap_err();
    assert!(matches!(err, RecorderError::AlreadyRecording));
    // The rejected start asked the host for nothing.
    assert_eq!(host.requests(), vec!["display", "microphone"]);

    handle.end().await;
    assert!(!recorder.is_active());
    let again = recorder.start(RecordingOptions::default()).await.unwrap();
    again.end().await;
    assert_eq!(host.live_tracks(), 0);
}

#[tokio::test]
async fn cancelled_start_releases_every_source() {
    // Idle sources never deliver a first frame, so start stays in the
    // compositor until it is cancelled.
    let host = SyntheticHost::builder().idle().build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let attempt =
        tokio::time::timeout(Duration::from_millis(200), recorder.start(all_sources())).await;

    assert!(attempt.is_err());
    assert_eq!(host.issued_tracks(), 4);
    assert_eq!(host.live_tracks(), 0);
    assert_eq!(host.recorders_created(), 0);
    assert!(!recorder.is_active());
    assert!(sink.files().is_empty());
}

#[tokio::test]
async fn dropping_every_handle_tears_down() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::new());
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(RecordingOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(handle);

    wait_until(|| !recorder.is_active()).await;
    assert_eq!(host.live_tracks(), 0);
    assert_eq!(sink.files().len(), 1);
}

#[tokio::test]
async fn failing_sink_is_reported_not_raised() {
    let host = SyntheticHost::builder().screen_size(160, 90).build();
    let sink = Arc::new(CollectingSink::failing("disk full"));
    let recorder = recorder(&host, &sink);

    let handle = recorder.start(RecordingOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    match handle.end().await {
        EndOutcome::DeliveryFailed { reason, .. } => assert!(reason.contains("disk full")),
        other => panic!("unexpected outcome {other}"),
    }
    assert_eq!(sink.files().len(), 1);
    assert_eq!(host.live_tracks(), 0);
}
