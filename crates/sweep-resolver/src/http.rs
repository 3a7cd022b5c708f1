//! HTTP client for the streaming search protocol.
//!
//! Issues a search request against the search service's event-stream
//! endpoint and decodes server-sent events incrementally into typed match
//! batches. Requests are impersonated as the initiating user so that
//! repository permissions are properly scoped.

use async_trait::async_trait;
use futures::StreamExt;
use sweep_core::ports::{Actor, SearchClient};
use sweep_core::search::{SearchError, SearchMatch, SearchProgress};
use sweep_core::{Error, Result};
use tracing::debug;

const SEARCH_CLIENT_USER_AGENT: &str = "Batch Changes repository resolver";
const IMPERSONATION_HEADER: &str = "X-Sweep-User-ID";

/// Streaming search client over HTTP server-sent events.
pub struct HttpSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        actor: &Actor,
        query: &str,
        on_matches: &mut (dyn FnMut(Vec<SearchMatch>) + Send),
    ) -> Result<()> {
        // Never send an unauthenticated search; permissions would not be
        // scoped to anyone.
        if !actor.is_authenticated() {
            return Err(Error::AuthenticationRequired);
        }

        let url = format!("{}/search/stream", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("display", "-1")])
            .header(reqwest::header::USER_AGENT, SEARCH_CLIENT_USER_AGENT)
            .header(IMPERSONATION_HEADER, &actor.uid)
            .send()
            .await
            .map_err(|e| Error::Search(format!("search request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Search(format!("search request failed: {e}")))?;

        let mut decoder = EventStreamDecoder::default();
        // An error event terminates the search, but the stream is drained
        // first so the failure isn't masked by a broken-pipe error.
        let mut stream_error: Option<Error> = None;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Search(format!("reading search stream: {e}")))?;
            for frame in decoder.feed(&chunk) {
                handle_frame(frame, on_matches, &mut stream_error)?;
            }
        }
        if let Some(frame) = decoder.finish() {
            handle_frame(frame, on_matches, &mut stream_error)?;
        }

        match stream_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn handle_frame(
    frame: EventFrame,
    on_matches: &mut (dyn FnMut(Vec<SearchMatch>) + Send),
    stream_error: &mut Option<Error>,
) -> Result<()> {
    match frame.event.as_str() {
        "matches" => {
            // Unknown match kinds are skipped, not failed on; the protocol
            // grows new kinds the resolver doesn't care about.
            let values: Vec<serde_json::Value> = serde_json::from_str(&frame.data)?;
            let matches: Vec<SearchMatch> = values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            on_matches(matches);
        }
        "error" => {
            let err: SearchError = serde_json::from_str(&frame.data)?;
            *stream_error = Some(Error::Search(err.message));
        }
        "progress" => {
            if let Ok(progress) = serde_json::from_str::<SearchProgress>(&frame.data) {
                debug!(match_count = progress.match_count, "Search progress");
            }
        }
        // "done" and anything newer.
        _ => {}
    }
    Ok(())
}

/// One decoded server-sent event.
#[derive(Debug, Default, PartialEq)]
struct EventFrame {
    event: String,
    data: String,
}

/// Incremental server-sent-event decoder. Frames are separated by a blank
/// line and may be split across arbitrary chunk boundaries.
#[derive(Debug, Default)]
struct EventStreamDecoder {
    buf: Vec<u8>,
}

impl EventStreamDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = find_frame_boundary(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..pos + 2).collect();
            if let Some(frame) = parse_frame(&raw) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever remains after the stream closed without a trailing
    /// blank line.
    fn finish(&mut self) -> Option<EventFrame> {
        let raw = std::mem::take(&mut self.buf);
        parse_frame(&raw)
    }
}

fn find_frame_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(raw: &[u8]) -> Option<EventFrame> {
    let text = String::from_utf8_lossy(raw);
    let mut frame = EventFrame::default();
    for line in text.lines() {
        if let Some(event) = line.strip_prefix("event:") {
            frame.event = event.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            frame.data.push_str(data.trim());
        }
    }
    if frame.event.is_empty() && frame.data.is_empty() {
        None
    } else {
        Some(frame)
    }
}
