use std::sync::Arc;

use anyhow::{Context, Result};
use fetchpool_lib::ratelimit::TokenBucket;
use fetchpool_lib::StopSignal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::options::ServeArgs;
use crate::protocol::{self, Command};

/// One request line read off the wire.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Data(String),
    /// The line exceeded the configured maximum and was discarded up to and
    /// including its newline
    TooLong,
    Eof,
}

/// Run the command server until a `SHUTDOWN` command or an interrupt.
pub(crate) async fn serve(args: &ServeArgs) -> Result<()> {
    let stop = StopSignal::new();
    let limiter = if args.limiter {
        Some(Arc::new(TokenBucket::new(
            args.limiter_capacity,
            args.limiter_refill,
        )?))
    } else {
        None
    };

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Cannot bind to {}:{}", args.host, args.port))?;
    let addr = listener.local_addr().context("Cannot read local address")?;
    println!("listening on {addr}");
    log::info!("command server ready on {addr}");

    let mut stop_rx = stop.listener();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("Failed to accept connection")?;
                log::debug!("client connected: {peer}");
                let stop = stop.clone();
                let limiter = limiter.clone();
                let max_line_bytes = args.max_line_bytes;
                tokio::spawn(async move {
                    if let Err(error) =
                        handle_client(stream, &stop, limiter.as_deref(), max_line_bytes).await
                    {
                        log::warn!("client {peer} error: {error:#}");
                    }
                });
            }
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.context("Failed to listen for interrupt")?;
                stop.stop();
            }
            () = stop_rx.stopped() => break,
        }
    }

    println!("shutdown complete");
    Ok(())
}

/// Serve one connection until the peer disconnects or the server stops.
async fn handle_client(
    stream: TcpStream,
    stop: &StopSignal,
    limiter: Option<&TokenBucket>,
    max_line_bytes: usize,
) -> Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let line = match read_request_line(&mut reader, max_line_bytes).await? {
            Line::Eof => break,
            Line::TooLong => {
                writer
                    .write_all(protocol::ERR_LINE_TOO_LONG.as_bytes())
                    .await?;
                writer.flush().await?;
                continue;
            }
            Line::Data(line) => line,
        };

        let request = protocol::parse_line(&line);

        // SHUTDOWN bypasses the rate gate so an operator can always stop
        // the server.
        if request.command != Command::Shutdown
            && let Some(bucket) = limiter
            && !bucket.allow(1.0)?
        {
            writer
                .write_all(protocol::ERR_RATE_LIMITED.as_bytes())
                .await?;
            writer.flush().await?;
            continue;
        }

        let response = match request.command {
            Command::Ping => protocol::PONG,
            Command::Shutdown => protocol::BYE,
            Command::Unknown => protocol::ERR_UNKNOWN,
        };
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;

        if request.command == Command::Shutdown {
            stop.stop();
            break;
        }
        if stop.is_stopped() {
            break;
        }
    }

    Ok(())
}

/// Read one newline-terminated line, capping its length.
///
/// An overlong line is consumed up to its newline but reported as
/// [`Line::TooLong`] so the connection can keep serving.
async fn read_request_line<R>(reader: &mut R, max_bytes: usize) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut truncated = false;

    loop {
        let (consumed, newline_found) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                // peer closed; a partial trailing line still counts
                if truncated {
                    return Ok(Line::TooLong);
                }
                if line.is_empty() {
                    return Ok(Line::Eof);
                }
                return Ok(Line::Data(String::from_utf8_lossy(&line).into_owned()));
            }

            match chunk.iter().position(|&byte| byte == b'\n') {
                Some(pos) => {
                    if !truncated && line.len() + pos <= max_bytes {
                        line.extend_from_slice(&chunk[..pos]);
                    } else {
                        truncated = true;
                    }
                    (pos + 1, true)
                }
                None => {
                    if !truncated && line.len() + chunk.len() <= max_bytes {
                        line.extend_from_slice(chunk);
                    } else {
                        truncated = true;
                    }
                    (chunk.len(), false)
                }
            }
        };

        reader.consume(consumed);
        if newline_found {
            if truncated {
                return Ok(Line::TooLong);
            }
            return Ok(Line::Data(String::from_utf8_lossy(&line).into_owned()));
        }
    }
}
