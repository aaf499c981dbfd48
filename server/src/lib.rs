//! Library entry for the `sessiongate` server.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the gateway,
//! and the building blocks (`app`, `auth`, `store`) for integration tests.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod http;
pub mod store;

use std::env;
use std::fs;
use std::sync::Once;

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info, warn};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();
static INIT_RUSTLS: Once = Once::new();

/// Installs the global tracing subscriber once per process.
///
/// `RUST_LOG` wins over the default level; the default is `error` when
/// `SESSIONGATE_INTEGRATION_TEST` is set and `info` otherwise.
pub fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("SESSIONGATE_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// Installs the OpenSSL-backed rustls provider used for calls to the identity provider.
pub fn init_rustls() {
    INIT_RUSTLS.call_once(|| {
        if rustls_openssl::default_provider()
            .install_default()
            .is_err()
        {
            warn!("A rustls crypto provider was already installed, keeping it");
        }
    });
}

/// The gateway's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the config file is missing or invalid, or if the server fails to start.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Serve(args) => {
            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            init_tracing(args.log_format);

            let startup_span = tracing::info_span!("gateway.startup", ?config_path, pid=?std::process::id(), version = env!("CARGO_PKG_VERSION"));

            init_rustls();

            info!(parent: &startup_span, "Starting sessiongate");

            app::start(&config_path, args.port, args.bind.as_deref())
                .instrument(startup_span)
                .await
        }
    }
}
