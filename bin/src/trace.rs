//! tracing configuration

use anyhow::Result;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, PrettyFields},
    },
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// log as "json" or "standard" (unstructured)
static DEFAULT_LOG_FORMAT: &str = "standard";

/// Configuration for the tracing subscriber
#[derive(Debug)]
pub struct Config {
    /// formatting to apply to logs
    pub log_frmt: String,
}

impl Config {
    /// Builds the subscriber and installs it as the global default.
    pub fn parse(dhcp_log: &str) -> Result<Self> {
        let log_frmt: String = env_parser::parse_var("LOG_FORMAT", DEFAULT_LOG_FORMAT)?;

        let filter = EnvFilter::try_new(dhcp_log)
            .or_else(|_| EnvFilter::try_new("info"))?
            .add_directive("hyper=off".parse()?);

        match &log_frmt[..] {
            "json" => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        fmt::layer()
                            .event_format(Format::default().pretty().with_source_location(false))
                            .fmt_fields(PrettyFields::new()),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer())
                    .init();
            }
        }

        Ok(Self { log_frmt })
    }
}
