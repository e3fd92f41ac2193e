use anyhow::Result;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::Config;

/// Installs the global subscriber: JSON lines when `log_json` is set, pretty output otherwise.
///
/// # Errors
/// Returns an error if the filter directives do not parse or a subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
	let filter = EnvFilter::try_new(&config.rust_log)?;

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(
				tracing_subscriber::fmt::layer()
					.event_format(tracing_subscriber::fmt::format().pretty())
					.with_filter(filter),
			)
		})
		.try_init()?;

	Ok(())
}
