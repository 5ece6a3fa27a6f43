use anyhow::Result;
use blogger_core::{TelemetryOptions, init_telemetry};

pub fn init_tracing() -> Result<()> {
    let options = TelemetryOptions {
        with_ansi: std::env::var_os("NO_COLOR").is_none(),
        ..TelemetryOptions::default()
    };
    init_telemetry(options)?;
    Ok(())
}
