//! Stream interception: frame a relayed byte stream into recorded chunks.
//!
//! The downstream client receives exactly the bytes the provider sent; the
//! interceptor works on a buffered copy. SSE providers contribute one chunk
//! per `data:` line (`event:`/`id:`/`retry:` lines and comments are framing
//! noise), NDJSON providers one chunk per non-empty line. Bytes that do not
//! yet form a complete line stay buffered until the next feed, so frames
//! split across network reads are reassembled transparently.

use chrono::Utc;
use uuid::Uuid;

use crate::model::StreamChunk;
use crate::providers::{Framing, ProviderParser};

pub struct StreamInterceptor {
    parser: Option<ProviderParser>,
    interaction_id: String,
    buffer: String,
    raw: String,
    chunks: Vec<StreamChunk>,
}

impl StreamInterceptor {
    pub fn new(parser: Option<ProviderParser>, interaction_id: &str) -> Self {
        Self {
            parser,
            interaction_id: interaction_id.to_string(),
            buffer: String::new(),
            raw: String::new(),
            chunks: Vec::new(),
        }
    }

    /// Feed one network read. Returns the chunks completed by these bytes,
    /// in receive order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        let text = String::from_utf8_lossy(bytes);
        self.raw.push_str(&text);

        if self.parser.is_none() {
            // Passthrough traffic is relayed and captured raw, not framed
            return Vec::new();
        }

        self.buffer.push_str(&text);
        let mut completed = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = self.frame_line(line.trim_end_matches(['\n', '\r'])) {
                completed.push(chunk);
            }
        }
        completed
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn flush_tail(&mut self) -> Vec<StreamChunk> {
        if self.parser.is_none() || self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.frame_line(line.trim_end_matches(['\n', '\r']))
            .into_iter()
            .collect()
    }

    fn frame_line(&mut self, line: &str) -> Option<StreamChunk> {
        if line.trim().is_empty() {
            return None;
        }
        let parser = self.parser?;

        let data = match parser.framing() {
            Framing::Sse => {
                let data = line.strip_prefix("data:")?.trim();
                if data.is_empty() {
                    return None;
                }
                data
            }
            Framing::Ndjson => line.trim(),
        };

        let info = parser.parse_stream_data(data);
        let chunk = StreamChunk {
            id: Uuid::new_v4().to_string(),
            interaction_id: self.interaction_id.clone(),
            seq: self.chunks.len() as u32,
            received_at: Utc::now(),
            raw: line.to_string(),
            decoded: info.decoded,
            event_type: info.event_type,
            delta_text: info.delta_text,
        };
        self.chunks.push(chunk.clone());
        Some(chunk)
    }

    /// Concatenated wire bytes and recorded chunks, consuming the interceptor.
    pub fn into_parts(self) -> (String, Vec<StreamChunk>) {
        (self.raw, self.chunks)
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }
}
