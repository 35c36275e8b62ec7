//! GStreamer plumbing shared by the capture sources and the recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;

use screenrec_platform_core::{PlatformError, PlatformResult};

/// A message from a pipeline bus that ends the pipeline's useful life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Eos,
    Error(String),
}

pub fn init_gstreamer() -> PlatformResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(PlatformError::device(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Whether an element factory is installed.
pub fn element_available(factory: &str) -> bool {
    init_gstreamer().is_ok() && gst::ElementFactory::find(factory).is_some()
}

pub fn parse_pipeline(name: &str, launch: &str) -> PlatformResult<gst::Pipeline> {
    init_gstreamer()?;
    tracing::debug!(pipeline = name, %launch, "Building pipeline");

    let element = gst::parse::launch(launch)
        .map_err(|e| PlatformError::device(format!("Failed to build {name} pipeline: {e}")))?;
    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| PlatformError::device(format!("{name} launch string did not produce a pipeline")))
}

/// Look up a named element and cast it to `T`.
pub fn element<T: IsA<gst::Element>>(
    pipeline: &gst::Pipeline,
    pipeline_name: &str,
    element_name: &str,
) -> PlatformResult<T> {
    pipeline
        .by_name(element_name)
        .and_then(|e| e.dynamic_cast::<T>().ok())
        .ok_or_else(|| {
            PlatformError::device(format!(
                "{pipeline_name} pipeline has no usable `{element_name}` element"
            ))
        })
}

/// Move to Playing and wait for the state change to settle.
pub fn play(name: &str, pipeline: &gst::Pipeline) -> PlatformResult<()> {
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| PlatformError::device(format!("Failed to start {name} pipeline: {e:?}")))?;

    // Live sources report NoPreroll, so this returns quickly for them.
    match pipeline.state(gst::ClockTime::from_seconds(10)) {
        (Ok(_), gst::State::Playing, _) => Ok(()),
        (Ok(_), state, _) => {
            tracing::warn!(pipeline = name, ?state, "Pipeline did not reach Playing within timeout");
            Ok(())
        }
        (Err(e), _, _) => {
            shut_down(name, pipeline);
            Err(PlatformError::device(format!(
                "{name} pipeline failed to reach Playing: {e:?}"
            )))
        }
    }
}

pub fn shut_down(name: &str, pipeline: &gst::Pipeline) {
    if let Err(e) = pipeline.set_state(gst::State::Null) {
        tracing::warn!(pipeline = name, error = ?e, "Failed to stop pipeline");
    }
}

/// Watch the bus on a dedicated thread until `closed` is set, reporting
/// EOS and errors to `on_event`.
pub fn watch_bus(
    name: &str,
    pipeline: &gst::Pipeline,
    closed: Arc<AtomicBool>,
    mut on_event: impl FnMut(BusEvent) + Send + 'static,
) -> PlatformResult<()> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| PlatformError::device(format!("{name} pipeline has no bus")))?;
    let name = name.to_string();

    std::thread::Builder::new()
        .name(format!("gst-bus-{name}"))
        .spawn(move || {
            let poll = gst::ClockTime::from_mseconds(100);
            while !closed.load(Ordering::SeqCst) {
                let Some(msg) = bus.timed_pop(poll) else {
                    continue;
                };
                match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(pipeline = %name, "EOS on bus");
                        on_event(BusEvent::Eos);
                    }
                    gst::MessageView::Error(e) => {
                        tracing::warn!(pipeline = %name, error = %e.error(), debug = ?e.debug(), "Pipeline error");
                        on_event(BusEvent::Error(e.error().to_string()));
                    }
                    _ => {}
                }
            }
        })
        .map_err(|e| PlatformError::device(format!("cannot spawn bus watcher: {e}")))?;
    Ok(())
}

pub fn clock_time(elapsed: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(elapsed.as_nanos() as u64)
}
