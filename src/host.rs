//! Stdio Host Loop
//!
//! Line-delimited JSON over stdio, in the same manner as a JSON-RPC stdio server
//! but carrying gateway batches instead of RPC calls.
//!
//! # Protocol
//! - Each input line is one [`CommandBatch`]
//! - Each output line is the same batch with every request populated and a report attached
//! - A line that does not parse yields `{"error": "Parse error: ..."}` and the loop continues
//! - End of input closes every slot and ends the loop
//!
//! Nothing but protocol lines is ever written to stdout; logs go to stderr.

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::driver::Driver;
use crate::request::CommandBatch;

/// Error line written for input that is not a batch
#[derive(Debug, Serialize)]
struct ErrorLine {
    error: String,
}

/// Serve batches on stdin/stdout until end of input
///
/// # Errors
///
/// Returns an error if stdio communication fails.
pub async fn serve<D: Driver>(dispatcher: Dispatcher<D>) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    serve_io(dispatcher, reader, writer).await
}

/// Serve batches read from `reader`, writing results to `writer`
///
/// # Errors
///
/// Returns an error if reading or writing fails.
pub async fn serve_io<D, R, W>(dispatcher: Dispatcher<D>, reader: R, mut writer: W) -> Result<()>
where
    D: Driver,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("host loop started");
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandBatch>(&line) {
            Ok(mut batch) => {
                dispatcher.dispatch_batch(&mut batch).await;
                serde_json::to_string(&batch)?
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed batch");
                serde_json::to_string(&ErrorLine { error: format!("Parse error: {e}") })?
            }
        };

        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    dispatcher.registry().close_all().await;
    info!("host loop finished, all slots closed");
    Ok(())
}
