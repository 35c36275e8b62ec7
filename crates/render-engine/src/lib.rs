//! Screenrec Render Engine
//!
//! Real-time compositing of a circular camera inset onto the screen
//! capture.
//!
//! # Pipeline Architecture
//!
//! ```text
//! screen track ──► latest frame ──┐
//!                                 ├── Surface::compose (background, clip, cover, border)
//! camera track ──► latest frame ──┘          │
//!                                            ├── render ticker (render_rate_hz)
//!                                            │
//!                                            ▼
//!                                  RateController (capture_fps)
//!                                            │
//!                                            ▼
//!                                    "composite" video track
//! ```

pub mod compositor;
pub mod frame_loop;
pub mod layout;
pub mod surface;

pub use compositor::*;
pub use frame_loop::{CompositeFrameLoop, FrameLoopRates, FrameLoopState};
pub use layout::{CoverFit, InsetLayout};
pub use surface::Surface;
