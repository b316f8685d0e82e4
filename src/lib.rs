//! Retouch - layered raster editing engine for AI region regeneration
//!
//! The [`editor::Editor`] facade ties together the layered compositor, the
//! interactive tools, the background blend pool and the generation backend.

pub mod blend;
pub mod compositor;
pub mod core;
pub mod editor;
pub mod generation;
pub mod pool;
pub mod raster;
pub mod storage;
pub mod tools;
pub mod viewport;

pub use editor::Editor;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber. Safe to call more than once.
pub fn init_logging() {
    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retouch_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("Retouch engine initializing...");
    }
}
