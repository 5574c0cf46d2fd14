//! Behaviour of the public log scraping and reconciliation API over realistic croc output.

use croc_relay::TransferStatus;
use croc_relay::parser::{
    Signals, StatusHint, extract_code, extract_code_from_lines, extract_progress,
    extract_progress_details, extract_status_hint, split_records,
};
use croc_relay::reconcile::TransferState;

/// Output of a typical `croc send` session, progress redraws included
const SESSION: &str = "Sending 'report.pdf' (2.7 MB)\n\
Code is: 7421-olive-tiger-lamp\n\
On the other computer run\n\
\n\
croc 7421-olive-tiger-lamp\n\
\n\
Sending (->192.168.1.20:53842)\n\
report.pdf  12% |█           | (340/2700 kB, 1.2 MB/s) [0s:2s]\r\
report.pdf  64% |██████      | (1.7/2.7 MB, 1.4 MB/s) [1s:1s]\r\
report.pdf 100% |████████████| (2.7/2.7 MB, 1.4 MB/s) [2s:0s]\n";

fn replay(text: &str) -> (TransferState, Vec<TransferStatus>) {
    let mut state = TransferState::default();
    let statuses = split_records(text)
        .map(|line| state.apply(&Signals::from_line(line)))
        .collect();
    (state, statuses)
}

#[test]
fn progress_outside_percentage_range_is_ignored() {
    assert_eq!(extract_progress("0%"), Some(0));
    assert_eq!(extract_progress("done 100%"), Some(100));
    assert_eq!(extract_progress("150%"), None);
    assert_eq!(extract_progress("-5%"), None);
    assert_eq!(extract_progress("backup-45%"), Some(45));
    assert_eq!(extract_progress("no percentage here"), None);
    assert_eq!(extract_progress("45% then 90%"), Some(45));
}

#[test]
fn explicit_code_beats_bare_invocation() {
    assert_eq!(
        extract_code("croc decoy-token\nCode is: real-code-here").as_deref(),
        Some("real-code-here")
    );
    assert_eq!(
        extract_code_from_lines(&["croc decoy-token", "Code is: real-code-here"]).as_deref(),
        Some("real-code-here")
    );
    assert_eq!(
        extract_code(r#"CROC_SECRET="1234-a-b-c" croc"#).as_deref(),
        Some("1234-a-b-c")
    );
}

#[test]
fn send_subcommand_is_not_a_code() {
    assert_eq!(extract_code("croc send --hash imohash /files/report.pdf"), None);
    assert_eq!(extract_code(""), None);
}

#[test]
fn status_hints_come_from_banner_lines() {
    assert_eq!(
        extract_status_hint("Sending 'report.pdf' (2.7 MB)"),
        Some(StatusHint::Preparing)
    );
    assert_eq!(
        extract_status_hint("On the other computer run"),
        Some(StatusHint::Waiting)
    );
    assert_eq!(extract_status_hint("report.pdf 10% |"), None);
}

#[test]
fn progress_bar_fields() {
    let details =
        extract_progress_details("report.pdf  64% |██████      | (1.7/2.7 MB, 1.4 MB/s) [1s:1s]");
    assert_eq!(details.percent, Some(64));
    assert_eq!(details.filename.as_deref(), Some("report.pdf"));
    assert_eq!(details.speed.as_deref(), Some("1.4MB/s"));
    assert_eq!(details.eta.as_deref(), Some("1s"));
}

#[test]
fn full_session_reaches_transferring_with_code() {
    let (state, statuses) = replay(SESSION);

    assert_eq!(statuses.first(), Some(&TransferStatus::Preparing));
    assert_eq!(statuses[1], TransferStatus::Waiting);
    assert_eq!(statuses.last(), Some(&TransferStatus::Transferring));
    assert_eq!(state.progress, 100);
    assert_eq!(state.code.as_deref(), Some("7421-olive-tiger-lamp"));
    assert_eq!(state.filename.as_deref(), Some("report.pdf"));
    assert!(state.saw_progress());
}

#[test]
fn terminal_status_is_sticky() {
    let (mut state, _) = replay(SESSION);
    assert!(state.finish(Some(0)));
    assert_eq!(state.status, TransferStatus::Done);

    state.apply(&Signals::from_line("report.pdf 12% |█ |"));
    assert!(!state.time_out());
    assert!(!state.finish(Some(1)));
    assert_eq!(state.status, TransferStatus::Done);
    assert_eq!(state.progress, 100);
}

#[test]
fn tail_scrape_matches_streamed_state() {
    let (streamed, _) = replay(SESSION);
    let mut scraped = TransferState::default();
    scraped.apply(&Signals::from_tail(SESSION, 200));

    assert_eq!(scraped.status, streamed.status);
    assert_eq!(scraped.progress, streamed.progress);
    assert_eq!(scraped.code, streamed.code);
}

#[test]
fn tail_without_progress_is_waiting() {
    let tail = "Sending 'report.pdf' (2.7 MB)\nCode is: 7421-olive-tiger-lamp\nOn the other computer run\n";
    let mut state = TransferState::default();
    assert_eq!(
        state.apply(&Signals::from_tail(tail, 200)),
        TransferStatus::Waiting
    );
}
