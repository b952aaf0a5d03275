use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "RFPSCAN_LOG_FORMAT";

/// Logs go to stderr; `RFPSCAN_LOG_FORMAT=json` switches to JSON lines.
pub fn init_logging() -> anyhow::Result<()> {
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::from_default_env().add_directive("rfpscan=info".parse()?);
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}
