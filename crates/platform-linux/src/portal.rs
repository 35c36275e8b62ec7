//! XDG Desktop Portal negotiation for Wayland screen capture.
//!
//! # Flow
//!
//! 1. Connect to `org.freedesktop.portal.ScreenCast`
//! 2. Create a session and select a monitor or window, cursor embedded
//! 3. Start: the compositor shows its consent dialog
//! 4. Open the PipeWire remote and hand fd + node id to `pipewiresrc`
//!
//! The session stays open until the returned [`PortalSession`] is dropped.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::{PersistMode, ResponseError};
use ashpd::WindowIdentifier;
use tokio::sync::oneshot;

use screenrec_platform_core::{PlatformError, PlatformResult};

/// A granted screencast. Dropping it closes the portal session.
#[derive(Debug)]
pub struct PortalSession {
    /// PipeWire node carrying the selected screen or window.
    pub node_id: u32,
    /// Stream size as reported by the compositor, when known.
    pub size: Option<(u32, u32)>,
    fd: OwnedFd,
    close_tx: Option<oneshot::Sender<()>>,
}

impl PortalSession {
    /// PipeWire remote fd. Valid for as long as `self` lives.
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for PortalSession {
    fn drop(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Ask the user, through the portal, for one screen or window.
pub async fn request_screencast() -> PlatformResult<PortalSession> {
    tracing::info!("Requesting XDG ScreenCast session");

    let proxy = Screencast::new().await.map_err(portal_error)?;
    let session = proxy.create_session().await.map_err(portal_error)?;
    proxy
        .select_sources(
            &session,
            CursorMode::Embedded,
            SourceType::Monitor | SourceType::Window,
            false,
            None,
            PersistMode::DoNot,
        )
        .await
        .map_err(portal_error)?;

    let response = proxy
        .start(&session, &WindowIdentifier::default())
        .await
        .map_err(portal_error)?
        .response()
        .map_err(portal_error)?;
    let stream = response
        .streams()
        .first()
        .ok_or_else(|| PlatformError::permission_denied("no screen or window was selected"))?;
    let node_id = stream.pipe_wire_node_id();
    let size = stream
        .size()
        .map(|(w, h)| (w.max(0) as u32, h.max(0) as u32));

    let fd = proxy
        .open_pipe_wire_remote(&session)
        .await
        .map_err(portal_error)?;

    let (close_tx, close_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        // Sender dropped or fired: either way the capture is over.
        let _ = close_rx.await;
        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "Portal session close failed");
        }
        drop(proxy);
    });

    tracing::info!(node_id, ?size, "ScreenCast granted");
    Ok(PortalSession {
        node_id,
        size,
        fd,
        close_tx: Some(close_tx),
    })
}

fn portal_error(err: ashpd::Error) -> PlatformError {
    match err {
        ashpd::Error::Response(ResponseError::Cancelled) => {
            PlatformError::permission_denied("screen sharing was cancelled")
        }
        ashpd::Error::Response(other) => {
            PlatformError::permission_denied(format!("screen sharing was refused: {other:?}"))
        }
        other => PlatformError::device(format!("ScreenCast portal failed: {other}")),
    }
}

/// Whether this session is expected to go through the portal.
pub fn is_portal_available() -> bool {
    std::env::var("WAYLAND_DISPLAY").is_ok()
        || std::env::var("XDG_SESSION_TYPE")
            .map(|v| v == "wayland")
            .unwrap_or(false)
}
