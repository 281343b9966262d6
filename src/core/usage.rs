//! Usage oracle: how much of the shared execution budget is consumed.
//!
//! The CLI-backed oracle shells out to the agent's usage command, strips
//! terminal control sequences from whatever it prints, and extracts a
//! percentage. The usage screen is interactive, so the command runs inside a
//! pseudo-terminal first and over plain pipes when no terminal can be opened.
//! Every failure mode (missing binary, non-zero exit, timeout, unrecognised
//! output) surfaces as [`OracleError::Unavailable`]; a reading is never
//! invented.

use std::io::{Read, Write};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::OracleError;

/// A usage figure and when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    /// Consumed share of the budget, clamped to 0..=100.
    pub pct: f64,
    /// When the budget resets, if the report said so.
    pub resets_at: Option<DateTime<Utc>>,
    /// When the reading was taken.
    pub observed_at: DateTime<Utc>,
}

/// Source of the current usage percentage.
#[async_trait]
pub trait UsageOracle: Send + Sync {
    /// Fetch the current reading, or `Unavailable` when it cannot be determined.
    async fn current_usage(&self) -> Result<UsageReading, OracleError>;
}

/// Oracle that runs the agent's usage-report command.
pub struct CliUsageOracle {
    command: Vec<String>,
    timeout: Duration,
    cache_ttl: Duration,
    use_pty: bool,
    cache: Mutex<Option<(Instant, UsageReading)>>,
}

impl CliUsageOracle {
    /// Create an oracle running `command` (program followed by arguments).
    pub const fn new(command: Vec<String>, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            command,
            timeout,
            cache_ttl,
            use_pty: true,
            cache: Mutex::new(None),
        }
    }

    /// Try a pseudo-terminal before plain pipes. On by default.
    #[must_use]
    pub const fn with_pty(mut self, use_pty: bool) -> Self {
        self.use_pty = use_pty;
        self
    }

    fn cached(&self) -> Option<UsageReading> {
        let guard = self.cache.lock();
        let (taken, reading) = guard.as_ref()?;
        let age = taken.elapsed();
        if age < self.cache_ttl {
            debug!(age_secs = age.as_secs(), "usage cache hit");
            return Some(reading.clone());
        }
        None
    }

    async fn execute(&self) -> Result<String, OracleError> {
        if self.command.is_empty() {
            return Err(OracleError::Unavailable("usage command is empty".into()));
        }
        if self.use_pty {
            let command = self.command.clone();
            let limit = self.timeout;
            match tokio::task::spawn_blocking(move || capture_with_pty(&command, limit)).await {
                Ok(Ok(capture)) => return capture.into_output(),
                Ok(Err(e)) => debug!(error = %e, "pty capture unavailable; using pipes"),
                Err(e) => debug!(error = %e, "pty capture task failed; using pipes"),
            }
        }
        self.execute_with_pipes().await
    }

    async fn execute_with_pipes(&self) -> Result<String, OracleError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| OracleError::Unavailable("usage command is empty".into()))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OracleError::Unavailable(format!("usage command `{program}` not found"))
                }
                _ => OracleError::Unavailable(format!("cannot spawn `{program}`: {e}")),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OracleError::Unavailable(format!("usage command failed: {e}")));
            }
            Err(_) => {
                return Err(OracleError::Unavailable(format!(
                    "usage command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            return Err(OracleError::Unavailable(format!(
                "usage command exited with {}",
                output.status
            )));
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}

/// Output read from the usage command's terminal.
struct PtyCapture {
    output: String,
    /// Exit code when the command ended by itself rather than being stopped.
    exit_code: Option<u32>,
}

impl PtyCapture {
    fn into_output(self) -> Result<String, OracleError> {
        match self.exit_code {
            Some(code) if code != 0 => Err(OracleError::Unavailable(format!(
                "usage command exited with code {code}"
            ))),
            _ => Ok(self.output),
        }
    }
}

/// Once the usage screen has been seen, wait this long for the rest of it.
const PTY_SETTLE: Duration = Duration::from_millis(500);
const PTY_KEY_PAUSE: Duration = Duration::from_millis(200);
const PTY_EXIT_WAIT: Duration = Duration::from_secs(2);
const PTY_POLL: Duration = Duration::from_millis(100);

/// Run `command` on a pseudo-terminal for at most `limit`, then dismiss the
/// screen (Esc, then Ctrl+C, then kill) and return what it printed.
fn capture_with_pty(command: &[String], limit: Duration) -> anyhow::Result<PtyCapture> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("usage command is empty"))?;
    let pair = native_pty_system().openpty(PtySize {
        rows: 50,
        cols: 200,
        pixel_width: 0,
        pixel_height: 0,
    })?;
    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    if std::env::var_os("TERM").is_none() {
        cmd.env("TERM", "xterm-256color");
    }
    let mut child = pair.slave.spawn_command(cmd)?;
    drop(pair.slave);
    let mut reader = pair.master.try_clone_reader()?;
    let mut writer = pair.master.take_writer()?;

    let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
    std::thread::spawn(move || {
        let mut chunk = [0_u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut buf = Vec::new();
    let mut deadline = Instant::now() + limit;
    let mut exit_code = None;
    loop {
        if let Some(status) = child.try_wait()? {
            exit_code = Some(status.exit_code());
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout((deadline - now).min(PTY_POLL)) {
            Ok(chunk) => {
                let text = String::from_utf8_lossy(&chunk);
                if text.contains("Resets") || text.contains("% used") {
                    deadline = deadline.min(Instant::now() + PTY_SETTLE);
                }
                buf.extend_from_slice(&chunk);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if exit_code.is_none() {
        for key in [b"\x1b", b"\x03"] {
            if writer.write_all(key).and_then(|()| writer.flush()).is_err() {
                break;
            }
            std::thread::sleep(PTY_KEY_PAUSE);
            if child.try_wait()?.is_some() {
                break;
            }
        }
        if child.try_wait()?.is_none() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "usage command kill failed");
            }
            let give_up = Instant::now() + PTY_EXIT_WAIT;
            while child.try_wait()?.is_none() && Instant::now() < give_up {
                std::thread::sleep(PTY_POLL);
            }
        }
    }

    let drain_until = Instant::now() + PTY_SETTLE;
    while let Ok(chunk) = rx.recv_deadline(drain_until) {
        buf.extend_from_slice(&chunk);
    }

    Ok(PtyCapture {
        output: String::from_utf8_lossy(&buf).into_owned(),
        exit_code,
    })
}

#[async_trait]
impl UsageOracle for CliUsageOracle {
    async fn current_usage(&self) -> Result<UsageReading, OracleError> {
        if let Some(reading) = self.cached() {
            return Ok(reading);
        }

        let raw = match self.execute().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "usage check failed");
                return Err(e);
            }
        };

        let reading = parse_usage_output(&clean_output(&raw), Utc::now()).inspect_err(|e| {
            warn!(error = %e, "usage output not understood");
        })?;
        debug!(usage_pct = reading.pct, "usage refreshed");
        *self.cache.lock() = Some((Instant::now(), reading.clone()));
        Ok(reading)
    }
}

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ansi regex compiles"));
static OSC_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)").expect("osc regex compiles"));

static USAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(used|usage|messages|remaining|limit)").expect("usage line regex compiles")
});
static DIRECT_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent regex compiles"));
static USED_OF_TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)used\s+(\d+)\s+of\s+(\d+)\s+messages").expect("used-of regex compiles")
});
static MESSAGES_SLASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)messages?:\s*(\d+)\s*/\s*(\d+)").expect("slash regex compiles")
});
static MESSAGES_USED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+messages?\s+used").expect("messages-used regex compiles")
});
static REMAINING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+remaining").expect("remaining regex compiles"));

static RESET_HOURS_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resets?\s+in\s+(\d+)\s*(?:hours?|h)\s*(\d+)\s*(?:minutes?|m)")
        .expect("reset h/m regex compiles")
});
static RESET_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)resets?\s+in\s+(\d+)\s*h").expect("reset h regex compiles"));
static RESET_MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)resets?\s+in\s+(\d+)\s*m").expect("reset m regex compiles"));
/// `Resets 2:59am (America/New_York)`, the agent CLI's own format.
static RESET_ZONED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resets\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)\s+\(([^)]+)\)")
        .expect("zoned reset regex compiles")
});
/// `Resets at 00:24`, `Resets @ 9:15pm (UTC+02:00)`, `Resets at 14:30 UTC`.
static RESET_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)resets?\s+(?:at|@)\s+(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(am|pm)?(?:[ \t]+\(([^)]+)\)|[ \t]+(UTC|GMT|[A-Za-z/_+-]+))?",
    )
    .expect("reset-at regex compiles")
});
static NEXT_RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)next\s+reset[:\s]+(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(UTC|GMT)?")
        .expect("next-reset regex compiles")
});
static UTC_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:UTC|GMT)?([+-])(\d{1,2})(?::?(\d{2}))?$").expect("offset regex compiles")
});

/// Strip ANSI/OSC sequences and non-printable characters, dropping blank lines.
pub fn clean_output(raw: &str) -> String {
    let text = raw.replace('\r', "\n");
    let text = ANSI_ESCAPE.replace_all(&text, "");
    let text = OSC_ESCAPE.replace_all(&text, "");
    let printable: String = text
        .chars()
        .map(|c| {
            if c == '\n' || c == ' ' || c.is_ascii_graphic() {
                c
            } else {
                ' '
            }
        })
        .collect();
    printable
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract a usage reading from cleaned command output.
pub fn parse_usage_output(output: &str, now: DateTime<Utc>) -> Result<UsageReading, OracleError> {
    let pct = parse_percent(output).ok_or_else(|| {
        let mut shown = output.replace('\n', " ").trim().to_owned();
        if shown.len() > 120 {
            let cut = (0..=117).rev().find(|i| shown.is_char_boundary(*i)).unwrap_or(0);
            shown.truncate(cut);
            shown.push_str("...");
        }
        OracleError::Unavailable(format!("could not parse usage percentage from '{shown}'"))
    })?;

    Ok(UsageReading {
        pct: pct.clamp(0.0, 100.0),
        resets_at: parse_reset(output, now),
        observed_at: now,
    })
}

fn ratio(used: &str, total: &str) -> Option<f64> {
    let used: f64 = used.parse().ok()?;
    let total: f64 = total.parse().ok()?;
    (total > 0.0).then(|| used / total * 100.0)
}

fn parse_percent(output: &str) -> Option<f64> {
    let lines: Vec<&str> = output.lines().collect();

    let direct = lines
        .iter()
        .filter(|line| USAGE_LINE.is_match(line))
        .find_map(|line| DIRECT_PERCENT.captures(line)?.get(1)?.as_str().parse().ok());
    if direct.is_some() {
        return direct;
    }

    let used_of = lines
        .iter()
        .find_map(|line| USED_OF_TOTAL.captures(line).and_then(|c| ratio(&c[1], &c[2])));
    if used_of.is_some() {
        return used_of;
    }

    let slash = lines
        .iter()
        .find_map(|line| MESSAGES_SLASH.captures(line).and_then(|c| ratio(&c[1], &c[2])));
    if slash.is_some() {
        return slash;
    }

    lines.iter().find_map(|line| {
        let used: f64 = MESSAGES_USED.captures(line)?[1].parse().ok()?;
        let remaining: f64 = REMAINING.captures(line)?[1].parse().ok()?;
        let total = used + remaining;
        (total > 0.0).then(|| used / total * 100.0)
    })
}

fn parse_reset(output: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(c) = RESET_ZONED.captures(output) {
        let minute = c.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let hour = to_24h(c[1].parse().ok()?, Some(&c[3]))?;
        return next_wall_time(hour, minute, 0, Some(&c[4]), now);
    }
    if let Some(c) = RESET_AT.captures(output) {
        let second = c.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let hour = to_24h(c[1].parse().ok()?, c.get(4).map(|m| m.as_str()))?;
        let zone = c.get(5).or_else(|| c.get(6)).map(|m| m.as_str());
        return next_wall_time(hour, c[2].parse().ok()?, second, zone, now);
    }
    if let Some(c) = RESET_HOURS_MINUTES.captures(output) {
        let hours: i64 = c[1].parse().ok()?;
        let minutes: i64 = c[2].parse().ok()?;
        return Some(now + chrono::Duration::hours(hours) + chrono::Duration::minutes(minutes));
    }
    if let Some(c) = RESET_HOURS.captures(output) {
        let hours: i64 = c[1].parse().ok()?;
        return Some(now + chrono::Duration::hours(hours));
    }
    if let Some(c) = RESET_MINUTES.captures(output) {
        let minutes: i64 = c[1].parse().ok()?;
        return Some(now + chrono::Duration::minutes(minutes));
    }
    if let Some(c) = NEXT_RESET.captures(output) {
        let second = c.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let zone = c.get(4).map(|m| m.as_str());
        return next_wall_time(c[1].parse().ok()?, c[2].parse().ok()?, second, zone, now);
    }
    None
}

fn to_24h(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem.map(str::to_ascii_lowercase).as_deref() {
        None => Some(hour),
        Some(_) if hour == 0 || hour > 12 => None,
        Some("am") => Some(hour % 12),
        Some(_) => Some(hour % 12 + 12),
    }
}

/// Zone named in a reset line.
enum ResetZone {
    Fixed(FixedOffset),
    Named(chrono_tz::Tz),
}

impl ResetZone {
    /// `UTC`/`GMT`, a `UTC+02:00` style offset, or an IANA name. Unknown or
    /// missing labels read as UTC.
    fn resolve(label: Option<&str>) -> Self {
        let utc = Self::Fixed(Utc.fix());
        let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
            return utc;
        };
        let compact = label.replace(' ', "").to_ascii_uppercase();
        if compact == "UTC" || compact == "GMT" {
            return utc;
        }
        if let Some(c) = UTC_OFFSET.captures(&compact) {
            let hours: i32 = c[2].parse().unwrap_or(99);
            let minutes: i32 = c.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(99));
            if hours <= 14 && minutes < 60 {
                let secs = (hours * 3600 + minutes * 60) * if &c[1] == "-" { -1 } else { 1 };
                if let Some(offset) = FixedOffset::east_opt(secs) {
                    return Self::Fixed(offset);
                }
            }
        }
        match label.parse::<chrono_tz::Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(_) => {
                debug!(zone = label, "unknown reset time zone; reading as UTC");
                utc
            }
        }
    }
}

/// Next instant after `now` at which the wall clock in `zone` reads `h:m:s`.
fn next_wall_time(
    hour: u32,
    minute: u32,
    second: u32,
    zone: Option<&str>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    match ResetZone::resolve(zone) {
        ResetZone::Fixed(offset) => next_in_zone(&offset, time, now),
        ResetZone::Named(tz) => next_in_zone(&tz, time, now),
    }
}

fn next_in_zone<Z: TimeZone>(zone: &Z, time: NaiveTime, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(zone).date_naive();
    [Some(today), today.succ_opt()]
        .into_iter()
        .flatten()
        .filter_map(|day| zone.from_local_datetime(&day.and_time(time)).earliest())
        .map(|at| at.with_timezone(&Utc))
        .find(|at| *at > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-10T23:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn strips_terminal_noise() {
        let raw = "\x1b[1mCurrent session\x1b[0m\r\n\x1b]0;title\x07  42% used  \n\n";
        assert_eq!(clean_output(raw), "Current session\n  42% used");
    }

    #[test]
    fn reads_direct_percentage() {
        let reading = parse_usage_output("Current session\n 37.5% used\nResets in 2h 15m", now()).unwrap();
        assert!((reading.pct - 37.5).abs() < f64::EPSILON);
        assert_eq!(
            reading.resets_at,
            Some(now() + chrono::Duration::minutes(135))
        );
    }

    #[test]
    fn percent_outside_usage_lines_is_ignored() {
        assert!(parse_usage_output("battery 90%", now()).is_err());
    }

    #[test]
    fn reads_ratio_formats() {
        let a = parse_usage_output("You have used 28 of 40 messages", now()).unwrap();
        assert!((a.pct - 70.0).abs() < 1e-9);
        let b = parse_usage_output("Messages: 10/40", now()).unwrap();
        assert!((b.pct - 25.0).abs() < 1e-9);
        let c = parse_usage_output("30 messages used, 10 remaining", now()).unwrap();
        assert!((c.pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_to_hundred() {
        let reading = parse_usage_output("usage: 140% of limit", now()).unwrap();
        assert!((reading.pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparsable_output_is_unavailable_not_zero() {
        let err = parse_usage_output("Welcome to the agent!", now()).unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    #[test]
    fn osc_stops_at_string_terminator() {
        let raw = "\x1b]0;title\x1b\\42% used\x07 tail";
        assert_eq!(clean_output(raw), "42% used  tail");
    }

    fn reset(line: &str) -> Option<DateTime<Utc>> {
        parse_reset(line, now())
    }

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn reads_cli_zoned_reset() {
        // 23:00Z is 18:00 in New York in January, so 2:59am is the next morning.
        assert_eq!(
            reset("Resets 2:59am (America/New_York)"),
            Some(at("2026-01-11T07:59:00Z"))
        );
        assert_eq!(reset("Resets 7pm (America/New_York)"), Some(at("2026-01-11T00:00:00Z")));
        assert_eq!(reset("Resets 12am (Europe/London)"), Some(at("2026-01-11T00:00:00Z")));
    }

    #[test]
    fn unknown_zone_reads_as_utc() {
        assert_eq!(reset("Resets 3am (Mars/Olympus)"), Some(at("2026-01-11T03:00:00Z")));
    }

    #[test]
    fn reads_absolute_reset_times() {
        assert_eq!(reset("Resets at 00:24"), Some(at("2026-01-11T00:24:00Z")));
        assert_eq!(reset("Resets @ 23:30:15 UTC"), Some(at("2026-01-10T23:30:15Z")));
        assert_eq!(
            reset("Resets at 9:15pm (UTC+02:00)"),
            Some(at("2026-01-11T19:15:00Z"))
        );
        assert_eq!(reset("Next reset: 14:30 UTC"), Some(at("2026-01-11T14:30:00Z")));
    }

    #[test]
    fn out_of_range_reset_is_ignored() {
        assert_eq!(reset("Resets at 25:10"), None);
        assert_eq!(reset("Resets 13pm (UTC)"), None);
    }

    #[test]
    fn reset_in_minutes_only() {
        let reading = parse_usage_output("12% used\nResets in 45 minutes", now()).unwrap();
        assert_eq!(reading.resets_at, Some(now() + chrono::Duration::minutes(45)));
    }
}
