//! Interactive confirmation gate.
//!
//! Yes/no prompts from all concurrently running jobs funnel through one
//! broker task that owns the input stream. Requests arrive over an mpsc
//! channel and are served one at a time, so prompts can never interleave
//! and an answer can never be attributed to the wrong job.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{JobError, Result};

/// Capacity of the prompt request channel.
const REQUEST_CAPACITY: usize = 32;

struct PromptRequest {
    job: String,
    question: String,
    default: bool,
    reply: oneshot::Sender<bool>,
}

/// Handle to the single-consumer prompt broker.
///
/// Clones share one broker task; the task exits when every handle is
/// dropped or its input stream ends. With `assume_yes`, [`confirm`]
/// resolves to the default immediately without touching the stream.
///
/// [`confirm`]: Self::confirm
#[derive(Clone)]
pub struct PromptGate {
    assume_yes: bool,
    sender: mpsc::Sender<PromptRequest>,
}

impl PromptGate {
    /// Create a gate that reads answers from stdin.
    pub fn new(assume_yes: bool) -> Self {
        Self::with_reader(assume_yes, BufReader::new(tokio::io::stdin()))
    }

    /// Create a gate reading answers from an arbitrary line stream.
    pub fn with_reader<R>(assume_yes: bool, reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self::with_io(assume_yes, reader, tokio::io::stdout())
    }

    fn with_io<R, W>(assume_yes: bool, reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(REQUEST_CAPACITY);
        tokio::spawn(serve_prompts(receiver, reader, writer));
        Self { assume_yes, sender }
    }

    /// Ask a yes/no question on behalf of `job`.
    ///
    /// An empty answer returns `default`; any other answer is yes iff it
    /// equals "y" case-insensitively.
    pub async fn confirm(&self, job: &str, question: &str, default: bool) -> Result<bool> {
        if self.assume_yes {
            debug!(job, question, default, "assume-yes: answering with default");
            return Ok(default);
        }

        let (reply, response) = oneshot::channel();
        self.sender
            .send(PromptRequest {
                job: job.to_string(),
                question: question.to_string(),
                default,
                reply,
            })
            .await
            .map_err(|_| JobError::PromptClosed)?;

        response.await.map_err(|_| JobError::PromptClosed)
    }
}

/// Broker loop: one prompt written and one line consumed per request.
/// The writer is owned here too, so prompt text never interleaves with
/// itself under concurrency.
async fn serve_prompts<R, W>(mut receiver: mpsc::Receiver<PromptRequest>, reader: R, mut writer: W)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = reader.lines();

    while let Some(request) = receiver.recv().await {
        let hint = if request.default { "[Y/n]" } else { "[y/N]" };
        let text = format!("{}: {} {} ", request.job, request.question, hint);
        if writer.write_all(text.as_bytes()).await.is_err() || writer.flush().await.is_err() {
            drop(request.reply);
            break;
        }

        let answer = match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    request.default
                } else {
                    line.eq_ignore_ascii_case("y")
                }
            }
            Ok(None) | Err(_) => {
                // Input stream is gone; dropping the reply surfaces
                // PromptClosed to the caller, then stop serving.
                drop(request.reply);
                break;
            }
        };

        let _ = request.reply.send(answer);
    }

    debug!("prompt broker stopped");
}
