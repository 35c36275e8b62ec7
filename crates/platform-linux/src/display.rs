//! Display server detection.

use screenrec_platform_core::DisplayServer;

/// Detect the display server from the session environment.
pub fn detect_display_server() -> DisplayServer {
    classify_display_server(
        std::env::var("WAYLAND_DISPLAY").ok().as_deref(),
        std::env::var("DISPLAY").ok().as_deref(),
        std::env::var("XDG_SESSION_TYPE").ok().as_deref(),
    )
}

/// Wayland wins over X11 since XWayland sessions export both.
pub fn classify_display_server(
    wayland_display: Option<&str>,
    x11_display: Option<&str>,
    session_type: Option<&str>,
) -> DisplayServer {
    let set = |v: Option<&str>| v.is_some_and(|v| !v.is_empty());
    if set(wayland_display) || session_type == Some("wayland") {
        DisplayServer::Wayland
    } else if set(x11_display) || session_type == Some("x11") {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}
