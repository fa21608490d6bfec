use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::client::Session;
use crate::protocol::responses::{READY, SYNTAX_ERROR, format_response};
use crate::protocol::{Command, CommandStatus, handle_command, parse_command};
use crate::server::ServerContext;

/// Outcome of reading one command line.
enum Line {
    Command(String),
    TooLong,
    Closed,
}

/// Handles one FTP control connection until the client quits or disconnects.
///
/// - Uses BufReader to read command lines from the client.
/// - Dispatches commands one at a time, in arrival order, via `handle_command`.
/// - While a transfer runs, watches the control connection so that a client
///   hanging up aborts the transfer and releases its port.
pub async fn handle_client(stream: TcpStream, client_addr: SocketAddr, ctx: Arc<ServerContext>) {
    let local_addr = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to read local address for {}: {}", client_addr, e);
            return;
        }
    };
    let mut session = Session::new(ctx.next_session_id(), client_addr, local_addr);
    info!("Session {} started for {}", session.id(), client_addr);

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let greeting = format_response(READY, &ctx.config.greeting);
    if let Err(e) = send(&mut write_half, &greeting).await {
        warn!("Failed to greet {}: {}", client_addr, e);
        return;
    }

    let max_len = ctx.config.max_command_length;
    loop {
        let line = match read_command_line(&mut reader, max_len).await {
            Ok(Line::Command(line)) => line,
            Ok(Line::TooLong) => {
                warn!("Command from {} exceeded {} bytes", client_addr, max_len);
                let reply = format_response(SYNTAX_ERROR, "Command too long.");
                if send(&mut write_half, &reply).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Line::Closed) => {
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
        };

        let command = parse_command(&line);
        match &command {
            Command::PASS(_) => info!("Received from {}: PASS ****", client_addr),
            other => info!("Received from {}: {:?}", client_addr, other),
        }

        let outcome = if command.uses_data_connection() {
            tokio::select! {
                outcome = handle_command(&mut session, command, &ctx, &mut write_half) => outcome,
                _ = control_closed(&mut reader) => {
                    warn!("Client {} hung up during a transfer, aborting it", client_addr);
                    break;
                }
            }
        } else {
            handle_command(&mut session, command, &ctx, &mut write_half).await
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to write to {}: {}", client_addr, e);
                break;
            }
        };

        if let CommandStatus::Failure(reason) = &result.status {
            debug!("Command from {} failed: {}", client_addr, reason);
        }
        if let Some(msg) = &result.message {
            if let Err(e) = send(&mut write_half, msg).await {
                error!("Failed to write to {}: {}", client_addr, e);
                break;
            }
        }
        if result.status == CommandStatus::CloseConnection {
            info!("Client {} requested to quit", client_addr);
            break;
        }
    }

    session.close().await;
    info!("Client {} disconnected", client_addr);
}

async fn send<W>(writer: &mut W, reply: &str) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(reply.as_bytes()).await?;
    writer.flush().await
}

/// Reads one CRLF or LF terminated line, reading at most `max_len` bytes of
/// it. The rest of an over-long line is discarded.
async fn read_command_line<R>(reader: &mut R, max_len: usize) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = max_len as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(Line::Closed);
    }

    if buf.last() != Some(&b'\n') {
        if (n as u64) < limit {
            // EOF in the middle of a line.
            return Ok(Line::Closed);
        }
        discard_line(reader).await?;
        return Ok(Line::TooLong);
    }

    let text = String::from_utf8_lossy(&buf);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.len() > max_len {
        return Ok(Line::TooLong);
    }
    Ok(Line::Command(line.to_string()))
}

async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let n = (&mut *reader).take(4096).read_until(b'\n', &mut scratch).await?;
        if n == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Resolves once the client closes the control connection. Pipelined input
/// does not count; it stays buffered for the next read.
async fn control_closed<R>(reader: &mut R)
where
    R: AsyncBufRead + Unpin,
{
    match reader.fill_buf().await {
        Ok(buf) if !buf.is_empty() => std::future::pending().await,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &[u8], max_len: usize) -> Vec<String> {
        let mut reader = BufReader::new(input);
        let mut lines = Vec::new();
        loop {
            match read_command_line(&mut reader, max_len).await.unwrap() {
                Line::Command(line) => lines.push(line),
                Line::TooLong => lines.push("<too long>".into()),
                Line::Closed => return lines,
            }
        }
    }

    #[tokio::test]
    async fn test_reads_crlf_and_lf_lines() {
        let lines = read_all(b"USER alice\r\nPASS x\nQUIT\r\n", 512).await;
        assert_eq!(lines, ["USER alice", "PASS x", "QUIT"]);
    }

    #[tokio::test]
    async fn test_long_line_is_rejected_and_skipped() {
        let mut input = b"STOR ".to_vec();
        input.extend(std::iter::repeat_n(b'a', 100));
        input.extend_from_slice(b"\r\nNOOP\r\n");
        let lines = read_all(&input, 16).await;
        assert_eq!(lines, ["<too long>", "NOOP"]);
    }

    #[tokio::test]
    async fn test_unterminated_line_at_eof_is_dropped() {
        let lines = read_all(b"NOOP\r\nQUI", 512).await;
        assert_eq!(lines, ["NOOP"]);
    }

    #[tokio::test]
    async fn test_control_closed_ignores_pipelined_input() {
        let mut closed = BufReader::new(&b""[..]);
        control_closed(&mut closed).await;

        let mut busy = BufReader::new(&b"NOOP\r\n"[..]);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), control_closed(&mut busy)).await;
        assert!(waited.is_err());
    }
}
