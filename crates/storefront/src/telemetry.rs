//! Logging and error tracking setup.
//!
//! Logs go to stderr so command output on stdout stays clean. When
//! `SENTRY_DSN` is set, warnings and errors become Sentry events and
//! lower levels become breadcrumbs.

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::StorefrontConfig;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "takeout_storefront=info,takeout_cli=info";

/// Keeps Sentry alive; hold it for the whole of `main`.
#[must_use = "dropping the guard flushes and disables Sentry"]
pub struct TelemetryGuard {
    sentry: Option<sentry::ClientInitGuard>,
}

impl TelemetryGuard {
    /// Whether errors are being reported to Sentry.
    #[must_use]
    pub const fn sentry_enabled(&self) -> bool {
        self.sentry.is_some()
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the global tracing subscriber and, if configured, Sentry.
///
/// `verbose` raises our crates to `debug` when `RUST_LOG` is not set.
pub fn init(config: &StorefrontConfig, verbose: bool) -> TelemetryGuard {
    // Sentry must be initialized before the subscriber
    let sentry = init_sentry(config);

    let default = if verbose {
        "takeout_storefront=debug,takeout_cli=debug"
    } else {
        DEFAULT_FILTER
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init();

    if sentry.is_some() {
        tracing::info!("Sentry initialized");
    }
    TelemetryGuard { sentry }
}
