//! Tracing initialisation

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "docmark_core=debug";

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already installed, so embedding
/// applications and tests may call this more than once.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing(DEFAULT_FILTER);
        assert!(!init_tracing(DEFAULT_FILTER));
    }
}
