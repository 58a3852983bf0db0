//! A `tracing-subscriber` formatter producing `[YYYY-MM-DDTHH:MM:SSZ
//! LEVEL logger-name] message`, UTC, matching the source's `logging`
//! setup rather than the stock `fmt::layer()` output.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_ENV_VAR: &str = "SOCKS_LOG";

/// Parse one of DEBUG/INFO/WARNING/WARN/ERROR/CRITICAL/FATAL
/// case-insensitively into a `tracing` filter directive, defaulting to
/// WARNING on anything unrecognized.
pub fn level_filter(raw: &str) -> &'static str {
    match raw.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        "CRITICAL" | "FATAL" => "error",
        _ => "warn",
    }
}

/// Build the `EnvFilter` the binary installs: `--log-level` wins if
/// given, otherwise `SOCKS_LOG`, otherwise `warn`.
pub fn build_env_filter(cli_level: Option<&str>) -> EnvFilter {
    let directive = cli_level
        .map(level_filter)
        .or_else(|| std::env::var(LOG_ENV_VAR).ok().map(|v| level_filter(&v)))
        .unwrap_or("warn");
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"))
}

struct UtcSecondsTimer;

impl FormatTime for UtcSecondsTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let (year, month, day, hour, minute, second) = civil_from_unix(now as i64);
        write!(
            w,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            year, month, day, hour, minute, second
        )
    }
}

/// Days-since-epoch civil calendar conversion (Howard Hinnant's
/// algorithm), used instead of pulling in a datetime crate for one
/// timestamp format.
fn civil_from_unix(unix_secs: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = unix_secs.div_euclid(86_400);
    let secs_of_day = unix_secs.rem_euclid(86_400);
    let hour = (secs_of_day / 3600) as u32;
    let minute = ((secs_of_day % 3600) / 60) as u32;
    let second = (secs_of_day % 60) as u32;

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };

    (year, month, day, hour, minute, second)
}

/// `FormatEvent` producing `[timestamp LEVEL target] message`.
pub struct BracketedFormatter;

impl<S, N> FormatEvent<S, N> for BracketedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[")?;
        UtcSecondsTimer.format_time(&mut writer)?;
        let level = level_label(*event.metadata().level());
        write!(writer, " {:5} {}] ", level, event.metadata().target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_is_case_insensitive_with_warning_default() {
        assert_eq!(level_filter("debug"), "debug");
        assert_eq!(level_filter("Info"), "info");
        assert_eq!(level_filter("WARN"), "warn");
        assert_eq!(level_filter("fatal"), "error");
        assert_eq!(level_filter("nonsense"), "warn");
    }

    #[test]
    fn civil_date_matches_known_epoch_values() {
        // 2021-01-01T00:00:00Z
        assert_eq!(civil_from_unix(1_609_459_200), (2021, 1, 1, 0, 0, 0));
        // 1970-01-01T00:00:00Z
        assert_eq!(civil_from_unix(0), (1970, 1, 1, 0, 0, 0));
    }
}
