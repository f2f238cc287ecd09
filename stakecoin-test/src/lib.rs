//! Miscellaneous test code for the stakecoin crates.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize a test: installs the tracing subscriber and the color-eyre
/// panic and error hooks, exactly once per process.
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_target(false);
        let filter_layer =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("color-eyre installs once");
    });
}

pub mod prelude {
    pub use crate::init;
    pub use color_eyre::eyre::{bail, ensure, eyre, Report, Result};
}
