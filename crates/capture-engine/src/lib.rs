//! Screenrec Capture Engine
//!
//! Owns one recording from permission prompts to the saved file.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  start(options) │              ScreenRecorder              │
//!  ──────────────►│  acquire ─► composite ─┐                 │
//!                 │          └─► mix ──────┴─► assemble      │
//!                 │                              │           │
//!                 │                              ▼           │
//!                 │                    MediaRecorder chunks  │
//!                 │                              │           │
//!                 │   stop sharing ─┐            ▼           │
//!  EndHandle::end ┼─────────────────┴──► controller task     │
//!                 │                     (teardown, once)     │
//!                 └──────────────────────────┬───────────────┘
//!                                            ▼
//!                                  RecordingSink (file / notice)
//! ```

pub mod acquire;
pub mod assemble;
pub mod session;
pub mod sink;

pub use acquire::{acquire_sources, AcquiredSources};
pub use assemble::assemble_stream;
pub use session::*;
pub use sink::*;
