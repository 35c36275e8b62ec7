//! Capture sources: a GStreamer pipeline ending in an appsink whose samples
//! are published on a [`MediaTrack`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use image::RgbaImage;

use screenrec_platform_core::{
    AudioChunk, MediaTrack, PlatformResult, TrackFeed, TrackKind, VideoFrame,
};

use crate::pipeline::{self, BusEvent};

const APPSINK: &str = "appsink name=sink max-buffers=4 drop=true sync=false";

/// Full-screen capture on X11.
pub fn x11_screen_launch(fps: u32) -> String {
    format!(
        "ximagesrc use-damage=false show-pointer=true ! queue max-size-buffers=8 leaky=downstream ! videoconvert ! videorate ! video/x-raw,format=RGBA,framerate={fps}/1 ! {APPSINK}"
    )
}

/// Capture of a node granted through the ScreenCast portal.
pub fn portal_screen_launch(fd: i32, node_id: u32, fps: u32) -> String {
    format!(
        "pipewiresrc fd={fd} path={node_id} do-timestamp=true ! queue max-size-buffers=8 leaky=downstream ! videoconvert ! videorate ! video/x-raw,format=RGBA,framerate={fps}/1 ! {APPSINK}"
    )
}

/// What the speakers play, read from the default sink's monitor.
pub fn system_audio_launch(sample_rate: u32, channels: u16) -> String {
    audio_launch("pulsesrc device=@DEFAULT_MONITOR@ do-timestamp=true", sample_rate, channels)
}

pub fn microphone_launch(sample_rate: u32, channels: u16) -> String {
    audio_launch("pulsesrc do-timestamp=true", sample_rate, channels)
}

fn audio_launch(source: &str, sample_rate: u32, channels: u16) -> String {
    format!(
        "{source} ! audioconvert ! audioresample ! audio/x-raw,format=F32LE,layout=interleaved,rate={sample_rate},channels={channels} ! {APPSINK}"
    )
}

pub fn camera_launch(device: &str, width: u32, height: u32, fps: u32) -> String {
    let device = device.replace('"', "\\\"");
    let fps = fps.clamp(1, 30);
    format!(
        "v4l2src device=\"{device}\" do-timestamp=true ! videoconvert ! videoscale ! videorate ! video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1 ! {APPSINK}"
    )
}

/// Start a source pipeline and expose it as a live track.
///
/// The track's release hook shuts the pipeline down; an EOS or error on the
/// pipeline ends the track. `keep_alive` is dropped together with the
/// pipeline.
pub fn launch_source<K: Send + 'static>(
    kind: TrackKind,
    label: &str,
    launch: &str,
    keep_alive: K,
) -> PlatformResult<MediaTrack> {
    let pipeline = pipeline::parse_pipeline(label, launch)?;
    let sink: gst_app::AppSink = pipeline::element(&pipeline, label, "sink")?;

    let (track, feed) = MediaTrack::new(kind, label);
    let started = Instant::now();
    let eos_feed = feed.clone();
    let sample_feed = feed.clone();
    sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                if publish_sample(kind, &sample_feed, &sample, started) {
                    Ok(gst::FlowSuccess::Ok)
                } else {
                    Err(gst::FlowError::Eos)
                }
            })
            .eos(move |_| {
                eos_feed.end();
            })
            .build(),
    );

    pipeline::play(label, &pipeline)?;

    let closed = Arc::new(AtomicBool::new(false));
    let bus_feed = feed.clone();
    let watched = pipeline::watch_bus(label, &pipeline, closed.clone(), move |event| match event {
        BusEvent::Eos | BusEvent::Error(_) => {
            bus_feed.end();
        }
    });
    if let Err(e) = watched {
        pipeline::shut_down(label, &pipeline);
        return Err(e);
    }

    let name = label.to_string();
    track.set_release_hook(move || {
        closed.store(true, Ordering::SeqCst);
        pipeline::shut_down(&name, &pipeline);
        drop(keep_alive);
        tracing::debug!(source = %name, "Source pipeline shut down");
    });

    tracing::info!(source = label, %kind, "Source pipeline playing");
    Ok(track)
}

/// Convert one appsink sample and push it. Returns false once the track is
/// no longer live. Malformed samples are skipped.
fn publish_sample(kind: TrackKind, feed: &TrackFeed, sample: &gst::Sample, started: Instant) -> bool {
    let (Some(buffer), Some(caps)) = (sample.buffer(), sample.caps()) else {
        return feed.is_live();
    };
    let Some(structure) = caps.structure(0) else {
        return feed.is_live();
    };
    let Ok(map) = buffer.map_readable() else {
        return feed.is_live();
    };
    let timestamp = buffer
        .pts()
        .map(|pts| Duration::from_nanos(pts.nseconds()))
        .unwrap_or_else(|| started.elapsed());

    match kind {
        TrackKind::Video => {
            let (Ok(width), Ok(height)) = (structure.get::<i32>("width"), structure.get::<i32>("height")) else {
                return feed.is_live();
            };
            match rgba_image(width.max(0) as u32, height.max(0) as u32, map.as_slice()) {
                Some(image) => feed.push_frame(VideoFrame::new(image, timestamp)),
                None => feed.is_live(),
            }
        }
        TrackKind::Audio => {
            let (Ok(rate), Ok(channels)) = (structure.get::<i32>("rate"), structure.get::<i32>("channels")) else {
                return feed.is_live();
            };
            let samples = f32le_samples(map.as_slice());
            feed.push_audio(AudioChunk::new(
                samples,
                rate.max(1) as u32,
                channels.clamp(1, u16::MAX as i32) as u16,
                timestamp,
            ))
        }
    }
}

/// Copy an RGBA buffer whose rows may be padded.
pub fn rgba_image(width: u32, height: u32, data: &[u8]) -> Option<RgbaImage> {
    let row = width as usize * 4;
    if width == 0 || height == 0 || data.len() < row * height as usize {
        return None;
    }
    let stride = data.len() / height as usize;
    if stride == row {
        return RgbaImage::from_raw(width, height, data[..row * height as usize].to_vec());
    }
    let mut pixels = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        pixels.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    RgbaImage::from_raw(width, height, pixels)
}

pub fn f32le_samples(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Pick the V4L2 node most likely to be a webcam.
pub fn detect_camera_device() -> Option<String> {
    let mut best: Option<(String, u32)> = None;
    for idx in 0..16u32 {
        let path = format!("/dev/video{idx}");
        if !std::path::Path::new(&path).exists() {
            continue;
        }
        let name = std::fs::read_to_string(format!("/sys/class/video4linux/video{idx}/name"))
            .unwrap_or_default();
        let score = camera_score(&name);
        tracing::debug!(device = %path, name = %name.trim(), score, "V4L2 candidate");
        if score > 0 && best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((path, score));
        }
    }
    best.map(|(path, _)| path)
}

/// Capture cards and tuners score zero; named cameras beat generic nodes.
pub fn camera_score(device_name: &str) -> u32 {
    const CAMERA: [&str; 6] = ["webcam", "camera", "cam", "facetime", "uvc", "v4l2loopback"];
    const NOT_CAMERA: [&str; 7] = ["tuner", "dvb", "hdmi", "capture", "encoder", "decoder", "metadata"];

    let name = device_name.to_lowercase();
    if NOT_CAMERA.iter().any(|kw| name.contains(kw)) {
        0
    } else if CAMERA.iter().any(|kw| name.contains(kw)) {
        80
    } else {
        10
    }
}
