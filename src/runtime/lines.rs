//! Byte stream to log record conversion
//!
//! croc redraws its progress bar with bare `\r`, so records are split on both
//! `\r` and `\n`. Bytes are decoded lossily; each record is trimmed and empty
//! records are dropped.

use super::LineStream;
use futures::{StreamExt, stream};
use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio_util::io::ReaderStream;

/// Turn a reader into a stream of log records
pub fn output_lines<R>(reader: R) -> LineStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let state = (ReaderStream::new(reader), Vec::new(), VecDeque::new(), false);

    stream::unfold(state, |(mut chunks, mut pending, mut ready, mut eof)| async move {
        loop {
            if let Some(line) = ready.pop_front() {
                return Some((line, (chunks, pending, ready, eof)));
            }
            if eof {
                return None;
            }
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    pending.extend_from_slice(&chunk);
                    drain_records(&mut pending, &mut ready);
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "output stream read failed");
                    flush(&mut pending, &mut ready);
                    eof = true;
                }
                None => {
                    flush(&mut pending, &mut ready);
                    eof = true;
                }
            }
        }
    })
    .boxed()
}

/// Merge two optional readers (stdout and stderr) into one record stream
///
/// Records from the two sides interleave as they arrive, not in the order the
/// child wrote them; prefer one shared pipe where the platform allows it.
pub fn merge_output<A, B>(stdout: Option<A>, stderr: Option<B>) -> LineStream
where
    A: AsyncRead + Send + Unpin + 'static,
    B: AsyncRead + Send + Unpin + 'static,
{
    let out = stdout.map_or_else(|| stream::empty().boxed(), output_lines);
    let err = stderr.map_or_else(|| stream::empty().boxed(), output_lines);
    stream::select(out, err).boxed()
}

/// Point a command's stdout and stderr at one pipe
///
/// One pipe keeps records in the order the child wrote them. Returns `None`
/// where that is unsupported; the caller then uses [`merge_output`]. Drop
/// `command` after spawning so the read side sees EOF when the child exits.
#[cfg(unix)]
pub fn shared_output(command: &mut Command) -> io::Result<Option<LineStream>> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe;

    let (reader, writer) = io::pipe()?;
    let stderr = writer.try_clone()?;
    let reader = pipe::Receiver::from_file(std::fs::File::from(OwnedFd::from(reader)))?;
    command.stdout(Stdio::from(writer)).stderr(Stdio::from(stderr));
    Ok(Some(output_lines(reader)))
}

/// Separate pipes, merged by the caller as records arrive
#[cfg(not(unix))]
pub fn shared_output(command: &mut Command) -> io::Result<Option<LineStream>> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    Ok(None)
}

fn drain_records(pending: &mut Vec<u8>, ready: &mut VecDeque<String>) {
    while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
        let record: Vec<u8> = pending.drain(..=pos).collect();
        push_record(&record[..pos], ready);
    }
}

fn flush(pending: &mut Vec<u8>, ready: &mut VecDeque<String>) {
    let rest = std::mem::take(pending);
    push_record(&rest, ready);
}

fn push_record(bytes: &[u8], ready: &mut VecDeque<String>) {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        ready.push_back(trimmed.to_string());
    }
}
