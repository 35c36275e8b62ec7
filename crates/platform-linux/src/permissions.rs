//! Capability detection and user guidance for Linux.

use serde::Serialize;

use screenrec_platform_core::DisplayServer;

use crate::display::detect_display_server;
use crate::pipeline::{element_available, init_gstreamer};
use crate::portal::is_portal_available;

/// A system capability screenrec may need.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

impl Capability {
    fn new(name: &str, description: &str, available: bool, required: bool, fix: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            available,
            required,
            fix_instructions: (!available).then(|| fix.to_string()),
        }
    }
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    let server = detect_display_server();
    vec![
        check_gstreamer(),
        check_screen_capture(server),
        check_encoders(),
        check_audio(),
        check_webcam(),
    ]
}

fn check_gstreamer() -> Capability {
    Capability::new(
        "GStreamer",
        "Media framework used for capture and encoding",
        init_gstreamer().is_ok(),
        true,
        "Install GStreamer: sudo apt install gstreamer1.0-tools gstreamer1.0-plugins-base",
    )
}

fn check_screen_capture(server: DisplayServer) -> Capability {
    match server {
        DisplayServer::Wayland => Capability::new(
            "Screen Capture Portal",
            "XDG ScreenCast portal and pipewiresrc for Wayland",
            is_portal_available() && element_available("pipewiresrc"),
            true,
            "Install xdg-desktop-portal for your desktop and gstreamer1.0-pipewire",
        ),
        DisplayServer::X11 => Capability::new(
            "X11 Screen Capture",
            "ximagesrc for X11 sessions",
            element_available("ximagesrc"),
            true,
            "Install gstreamer1.0-plugins-good",
        ),
        _ => Capability::new(
            "Screen Capture",
            "A graphical session to capture from",
            false,
            true,
            "Run inside a Wayland or X11 desktop session",
        ),
    }
}

fn check_encoders() -> Capability {
    let available = ["vp8enc", "opusenc", "webmmux"]
        .iter()
        .all(|factory| element_available(factory));
    Capability::new(
        "WebM Encoding",
        "VP8 and Opus encoders with the WebM muxer",
        available,
        true,
        "Install gstreamer1.0-plugins-good and gstreamer1.0-plugins-base",
    )
}

fn check_audio() -> Capability {
    Capability::new(
        "Audio Capture",
        "PulseAudio/PipeWire microphone and system audio via pulsesrc",
        element_available("pulsesrc"),
        false,
        "Install gstreamer1.0-pulseaudio and pipewire-pulse",
    )
}

fn check_webcam() -> Capability {
    let has_device = (0..16).any(|idx| std::path::Path::new(&format!("/dev/video{idx}")).exists());
    Capability::new(
        "Webcam Device",
        "Video4Linux camera for the picture-in-picture inset",
        has_device && element_available("v4l2src"),
        false,
        "Connect a webcam and verify /dev/video* exists (v4l2-ctl --list-devices)",
    )
}

/// Names of required capabilities that are missing.
pub fn missing_required(capabilities: &[Capability]) -> Vec<&str> {
    capabilities
        .iter()
        .filter(|c| c.required && !c.available)
        .map(|c| c.name.as_str())
        .collect()
}

pub fn format_capability_report(capabilities: &[Capability]) -> String {
    let mut report = String::from("screenrec system capabilities:\n");
    report.push_str(&"-".repeat(60));
    report.push('\n');

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };
        report.push_str(&format!("  {status} {}: {}\n", cap.name, cap.description));
        if let Some(fix) = &cap.fix_instructions {
            report.push_str(&format!("    Fix: {fix}\n"));
        }
    }
    report
}

pub fn print_capability_report(capabilities: &[Capability]) {
    print!("{}", format_capability_report(capabilities));
}
