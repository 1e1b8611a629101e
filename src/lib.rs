//! Timing and judgment engine for a five-lane falling-note rhythm game.
//!
//! The crate owns everything between the chart file and the renderer: the
//! transport clock with its calibration offset, the note field that places
//! notes every frame, hit/miss judgment and scoring, the latency detector and
//! the session lifecycle. Rendering and audio output stay outside and talk to
//! it through [`core::transport::Transport`] and [`game::session::FrameSnapshot`].

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod game;
