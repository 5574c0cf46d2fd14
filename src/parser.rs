//! Log line parser for croc output
//!
//! Every function here is pure and total: unrecognized input yields `None`,
//! never an error. The same functions serve the streaming path (one line at a
//! time) and the container reaper (a batch of tail lines).

use crate::types::TransferStatus;
use regex::Regex;
use std::sync::LazyLock;

fn pattern(source: &str) -> Regex {
    #[allow(clippy::expect_used)]
    Regex::new(source).expect("built-in log pattern must compile")
}

static PERCENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\d+)%"));

static SECRET_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(?i)CROC_SECRET="?([a-z0-9-]+)"?"#));

static CODE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\bcode(?:\s+is)?:\s*([a-z0-9-]+)"));

static BARE_INVOCATION: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\bcroc\s+([a-z0-9][a-z0-9-]*)\b"));

static BAR_PERCENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\d{1,3})%\s*\|"));

static SPEED: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\d+(?:\.\d+)?\s*[kmgtpe]i?b/s"));

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[([^\]]*)\]"));

/// Coarse status suggested by a single line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusHint {
    /// croc announced the file it is about to send
    Preparing,
    /// croc printed receiver instructions
    Waiting,
}

impl StatusHint {
    /// The status this hint maps onto
    pub fn status(self) -> TransferStatus {
        match self {
            Self::Preparing => TransferStatus::Preparing,
            Self::Waiting => TransferStatus::Waiting,
        }
    }
}

/// Fields pulled out of a progress-bar line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressDetails {
    /// Percentage in front of the bar (`45%|`)
    pub percent: Option<u8>,
    /// Text before the percentage, usually the file name
    pub filename: Option<String>,
    /// Speed with internal whitespace removed (`3.2MB/s`)
    pub speed: Option<String>,
    /// Remaining time, the last `:`-separated field of the first `[...]` group
    pub eta: Option<String>,
}

/// First integer immediately followed by `%`, if it lies in `[0, 100]`
pub fn extract_progress(line: &str) -> Option<u8> {
    let digits = PERCENT.captures(line)?.get(1)?;
    if is_negative_sign(&line[..digits.start()]) {
        return None;
    }
    let value: u64 = digits.as_str().parse().ok()?;
    u8::try_from(value).ok().filter(|v| *v <= 100)
}

/// A `-` right before the digits is a sign only when it does not end a word
/// (`-5%` versus `backup-45%`)
fn is_negative_sign(before: &str) -> bool {
    let mut rest = before.chars().rev();
    rest.next() == Some('-') && rest.next().is_none_or(char::is_whitespace)
}

/// Transfer code in `text`
///
/// Patterns are tried in priority order: `CROC_SECRET=...`, then
/// `Code is: ...` / `Code: ...`, then a bare `croc <token>` invocation.
pub fn extract_code(text: &str) -> Option<String> {
    extract_code_from_lines(&[text])
}

/// Transfer code across several lines
///
/// Each pattern is tried against every line before falling back to the next
/// pattern, so an explicit `Code is:` anywhere beats a bare invocation earlier
/// in the batch.
pub fn extract_code_from_lines<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let each = || lines.iter().map(AsRef::as_ref);

    for regex in [&*SECRET_ASSIGNMENT, &*CODE_LABEL] {
        if let Some(code) = each().find_map(|line| first_capture(regex, line)) {
            return Some(code);
        }
    }

    each().find_map(bare_invocation_code)
}

fn first_capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|code| !code.is_empty())
}

fn bare_invocation_code(line: &str) -> Option<String> {
    BARE_INVOCATION
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|token| !token.eq_ignore_ascii_case("send"))
        .map(str::to_string)
}

/// Status suggested by `line`, if any
pub fn extract_status_hint(line: &str) -> Option<StatusHint> {
    let lower = line.trim().to_lowercase();
    if lower.starts_with("sending") {
        return Some(StatusHint::Preparing);
    }
    if lower.contains("on the other computer run")
        || (lower.contains("waiting") && lower.contains("receiver"))
    {
        return Some(StatusHint::Waiting);
    }
    None
}

/// Percent, file name, speed and ETA from a progress-bar line
///
/// Each field is independent; a line without a bar may still carry a speed.
pub fn extract_progress_details(line: &str) -> ProgressDetails {
    let mut details = ProgressDetails::default();

    if let Some(captures) = BAR_PERCENT.captures(line)
        && let (Some(whole), Some(value)) = (captures.get(0), captures.get(1))
    {
        details.percent = value.as_str().parse::<u8>().ok().filter(|v| *v <= 100);
        let name = line[..whole.start()].trim();
        if !name.is_empty() {
            details.filename = Some(name.to_string());
        }
    }

    details.speed = SPEED
        .find(line)
        .map(|m| m.as_str().split_whitespace().collect::<String>());

    details.eta = BRACKETED
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|inner| inner.as_str().rsplit(':').next())
        .map(str::trim)
        .filter(|eta| !eta.is_empty())
        .map(str::to_string);

    details
}

/// Split raw output into records on `\r` and `\n`, trimming and dropping blanks
///
/// croc redraws its progress bar with bare carriage returns, so both count as
/// record separators.
pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Everything the parser could infer from one line or a batch of lines
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    /// Latest progress percentage
    pub progress: Option<u8>,
    /// Transfer code
    pub code: Option<String>,
    /// Latest status hint
    pub hint: Option<StatusHint>,
    /// Latest speed
    pub speed: Option<String>,
    /// Latest ETA
    pub eta: Option<String>,
    /// Latest file name from a progress bar
    pub filename: Option<String>,
    /// Last non-empty line
    pub last_line: Option<String>,
}

impl Signals {
    /// Signals carried by a single line
    pub fn from_line(line: &str) -> Self {
        let line = line.trim();
        let details = extract_progress_details(line);
        Self {
            progress: extract_progress(line),
            code: extract_code(line),
            hint: extract_status_hint(line),
            speed: details.speed,
            eta: details.eta,
            filename: details.filename,
            last_line: (!line.is_empty()).then(|| line.to_string()),
        }
    }

    /// Signals carried by the last `max_lines` records of a log tail
    ///
    /// Progress prefers the richer `NN%|` bar format and falls back to any
    /// percentage. Hints and details come from the most recent line that has
    /// them.
    pub fn from_tail(text: &str, max_lines: usize) -> Self {
        let records: Vec<&str> = split_records(text).collect();
        let start = records.len().saturating_sub(max_lines);
        let lines = &records[start..];

        let bar = lines.iter().rev().find_map(|line| {
            let details = extract_progress_details(line);
            details.percent.map(|_| details)
        });
        let progress = match &bar {
            Some(details) => details.percent,
            None => lines.iter().rev().find_map(|line| extract_progress(line)),
        };
        let speed = lines
            .iter()
            .rev()
            .find_map(|line| extract_progress_details(line).speed);
        let (eta, filename) = bar
            .map(|details| (details.eta, details.filename))
            .unwrap_or_default();

        Self {
            progress,
            code: extract_code_from_lines(lines),
            hint: lines.iter().rev().find_map(|line| extract_status_hint(line)),
            speed,
            eta,
            filename,
            last_line: lines.last().map(|line| line.to_string()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_accepts_only_zero_to_hundred() {
        assert_eq!(extract_progress("report.pdf 45% |████"), Some(45));
        assert_eq!(extract_progress("0%"), Some(0));
        assert_eq!(extract_progress("100%"), Some(100));
        assert_eq!(extract_progress("150%"), None);
        assert_eq!(extract_progress("-5%"), None);
        assert_eq!(extract_progress("drift -5%"), None);
        assert_eq!(extract_progress("backup-45%"), Some(45));
        assert_eq!(extract_progress("no percentage here"), None);
        assert_eq!(extract_progress("99999999999999999999999%"), None);
    }

    #[test]
    fn progress_uses_first_percentage() {
        assert_eq!(extract_progress("12% then 80%"), Some(12));
    }

    #[test]
    fn code_from_secret_assignment() {
        assert_eq!(
            extract_code(r#"CROC_SECRET="7421-olive-tiger-lamp" croc"#),
            Some("7421-olive-tiger-lamp".into())
        );
        assert_eq!(
            extract_code(r#"croc_secret="abc-def""#),
            Some("abc-def".into())
        );
    }

    #[test]
    fn code_from_label() {
        assert_eq!(
            extract_code("Code is: 1234-funny-bear-seven"),
            Some("1234-funny-bear-seven".into())
        );
        assert_eq!(extract_code("code: abc-def"), Some("abc-def".into()));
        assert_eq!(extract_code("CODE IS:xyz-1"), Some("xyz-1".into()));
    }

    #[test]
    fn code_from_bare_invocation() {
        assert_eq!(
            extract_code("    croc 1234-funny-bear-seven"),
            Some("1234-funny-bear-seven".into())
        );
    }

    #[test]
    fn bare_send_subcommand_is_never_a_code() {
        assert_eq!(extract_code("croc send abc-def-ghi"), None);
        assert_eq!(extract_code("CROC SEND file.txt"), None);
        assert_eq!(extract_code("croc --yes"), None);
    }

    #[test]
    fn secret_assignment_beats_label_beats_bare() {
        let lines = [
            "croc stray-token",
            "Code is: labeled-code",
            r#"CROC_SECRET="secret-code" croc"#,
        ];
        assert_eq!(extract_code_from_lines(&lines), Some("secret-code".into()));
        assert_eq!(
            extract_code_from_lines(&lines[..2]),
            Some("labeled-code".into())
        );
        assert_eq!(
            extract_code_from_lines(&lines[..1]),
            Some("stray-token".into())
        );
    }

    #[test]
    fn empty_label_yields_nothing() {
        assert_eq!(extract_code("Code is: "), None);
        assert_eq!(extract_code("zipcode: 12345"), None);
    }

    #[test]
    fn status_hints() {
        assert_eq!(
            extract_status_hint("Sending 'report.pdf' (2.7 kB)"),
            Some(StatusHint::Preparing)
        );
        assert_eq!(
            extract_status_hint("On the other computer run:"),
            Some(StatusHint::Waiting)
        );
        assert_eq!(
            extract_status_hint("waiting for the receiver to connect"),
            Some(StatusHint::Waiting)
        );
        assert_eq!(extract_status_hint("waiting..."), None);
        assert_eq!(extract_status_hint("hashing report.pdf"), None);
    }

    #[test]
    fn progress_bar_details() {
        let line = "report.pdf  45% |█████████           | (1.2/2.7 MB, 3.2 MB/s) [1s:2s]";
        let details = extract_progress_details(line);
        assert_eq!(details.percent, Some(45));
        assert_eq!(details.filename.as_deref(), Some("report.pdf"));
        assert_eq!(details.speed.as_deref(), Some("3.2MB/s"));
        assert_eq!(details.eta.as_deref(), Some("2s"));
    }

    #[test]
    fn speed_units() {
        assert_eq!(
            extract_progress_details("at 3.2MB/s").speed.as_deref(),
            Some("3.2MB/s")
        );
        assert_eq!(
            extract_progress_details("1200kiB/s").speed.as_deref(),
            Some("1200kiB/s")
        );
        assert_eq!(extract_progress_details("3.2 meters/s").speed, None);
    }

    #[test]
    fn details_on_plain_line_are_empty() {
        assert_eq!(
            extract_progress_details("Code is: abc"),
            ProgressDetails::default()
        );
    }

    #[test]
    fn bar_percentage_above_hundred_is_dropped() {
        let details = extract_progress_details("file 999%|");
        assert_eq!(details.percent, None);
        assert_eq!(details.filename.as_deref(), Some("file"));
    }

    #[test]
    fn records_split_on_carriage_returns() {
        let records: Vec<_> = split_records(" 10%|\r 20%|\r\n\nCode is: x\n").collect();
        assert_eq!(records, vec!["10%|", "20%|", "Code is: x"]);
    }

    #[test]
    fn line_signals() {
        let signals = Signals::from_line("  Code is: funny-bear-7  ");
        assert_eq!(signals.code.as_deref(), Some("funny-bear-7"));
        assert_eq!(signals.progress, None);
        assert_eq!(signals.last_line.as_deref(), Some("Code is: funny-bear-7"));
    }

    #[test]
    fn tail_signals_take_latest_values() {
        let tail = "Sending 'report.pdf' (2.7 kB)\n\
                    Code is: 7421-olive-tiger-lamp\n\
                    On the other computer run:\n\
                    report.pdf  10% |██  | (0.3/2.7 MB, 1.0 MB/s) [0s:3s]\r\
                    report.pdf  60% |████| (1.6/2.7 MB, 2.5 MB/s) [1s:1s]\r";
        let signals = Signals::from_tail(tail, 200);
        assert_eq!(signals.progress, Some(60));
        assert_eq!(signals.code.as_deref(), Some("7421-olive-tiger-lamp"));
        assert_eq!(signals.hint, Some(StatusHint::Waiting));
        assert_eq!(signals.speed.as_deref(), Some("2.5MB/s"));
        assert_eq!(signals.eta.as_deref(), Some("1s"));
        assert_eq!(signals.filename.as_deref(), Some("report.pdf"));
        assert!(signals.last_line.unwrap().contains("60%"));
    }

    #[test]
    fn tail_respects_line_limit() {
        let tail = "Code is: early-code\nline\nline\n";
        assert_eq!(Signals::from_tail(tail, 2).code, None);
        assert_eq!(
            Signals::from_tail(tail, 3).code.as_deref(),
            Some("early-code")
        );
    }

    #[test]
    fn tail_without_bar_falls_back_to_plain_percent() {
        let signals = Signals::from_tail("sent 30%\nsent 70%", 10);
        assert_eq!(signals.progress, Some(70));
        assert_eq!(signals.eta, None);
    }

    #[test]
    fn empty_tail_has_no_signals() {
        assert_eq!(Signals::from_tail("", 200), Signals::default());
    }
}
