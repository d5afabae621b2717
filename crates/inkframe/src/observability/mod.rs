//! Tracing initialisation for the inkframe daemon.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a CLI log level
pub fn default_filter(log_level: &str) -> String {
    if log_level == "trace" {
        format!("inkframe={log_level},sea_orm=debug")
    } else {
        format!("inkframe={log_level}")
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `log_level`. With `json` set, events are
/// written as one JSON object per line for log shippers.
pub fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("info"), "inkframe=info");
        assert_eq!(default_filter("trace"), "inkframe=trace,sea_orm=debug");
    }
}
