use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{header::ACCEPT, Client};
use shared::protocol::PushFrame;
use tracing::{debug, info, warn};
use url::Url;

use super::{PushEvent, PushSource};

/// Incremental `text/event-stream` decoder yielding the `data` of each record.
///
/// Lines end in `\n` or `\r\n`; records end at a blank line. Multiple `data`
/// lines in one record join with `\n`. Comments and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.process_line(&line, &mut records);
        }
        records
    }

    fn process_line(&mut self, line: &str, records: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                records.push(self.data.join("\n"));
                self.data.clear();
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }
}

enum Phase {
    Idle,
    Streaming(BoxStream<'static, reqwest::Result<Vec<u8>>>),
    Finished,
}

/// Push source over a Server-Sent-Events stream.
pub struct SseSource {
    http: Client,
    url: Url,
    phase: Phase,
    decoder: SseDecoder,
    pending: VecDeque<PushEvent>,
}

impl SseSource {
    pub fn new(http: Client, url: Url) -> Self {
        Self {
            http,
            url,
            phase: Phase::Idle,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    async fn connect(http: Client, url: Url) -> Result<BoxStream<'static, reqwest::Result<Vec<u8>>>> {
        let response = http
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("failed to connect push stream {url}"))?
            .error_for_status()?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed())
    }
}

#[async_trait]
impl PushSource for SseSource {
    async fn next_event(&mut self) -> Option<PushEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let stream = match &mut self.phase {
                Phase::Finished => return None,
                Phase::Idle => {
                    return match Self::connect(self.http.clone(), self.url.clone()).await {
                        Ok(stream) => {
                            info!(url = %self.url, "sse push channel open");
                            self.decoder = SseDecoder::new();
                            self.phase = Phase::Streaming(stream);
                            Some(PushEvent::Opened)
                        }
                        Err(err) => {
                            warn!(url = %self.url, error = %err, "sse connect failed");
                            self.phase = Phase::Finished;
                            Some(PushEvent::Error(format!("{err:#}")))
                        }
                    };
                }
                Phase::Streaming(stream) => stream,
            };
            let next = stream.next().await;
            match next {
                Some(Ok(chunk)) => {
                    for record in self.decoder.feed(&chunk) {
                        debug!(frame = %record, "sse frame");
                        self.pending
                            .push_back(PushEvent::Frame(PushFrame::parse(&record)));
                    }
                }
                Some(Err(err)) => {
                    warn!(url = %self.url, error = %err, "sse stream read failed");
                    self.phase = Phase::Finished;
                    return Some(PushEvent::Error(format!("push stream read failed: {err}")));
                }
                None => {
                    info!(url = %self.url, "sse stream ended by server");
                    self.phase = Phase::Finished;
                    return Some(PushEvent::Closed);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.phase = Phase::Finished;
        self.pending.clear();
    }

    fn rearm(&mut self) {
        if matches!(self.phase, Phase::Finished) {
            self.phase = Phase::Idle;
        }
    }
}
