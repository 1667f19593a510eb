//! Incremental decoding of a top-level JSON array.
//!
//! The array is pulled element by element from a blocking reader on a
//! dedicated thread and handed to async code in fixed-size batches over a
//! bounded channel, so memory use is bounded by the channel depth times the
//! batch size regardless of the feed size.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde_json::Value;
use std::fmt;
use std::io::Read;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Batches buffered between the decoder thread and the importer.
const CHANNEL_DEPTH: usize = 2;

const STOP_MARKER: &str = "decoding stopped";

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("{0}")]
    Framing(String),
    #[error("read failed: {0}")]
    Io(String),
    #[error("decoding cancelled")]
    Cancelled,
}

pub struct DecodedBatches {
    pub batches: mpsc::Receiver<Vec<Value>>,
    /// Resolves to the number of elements decoded once the closing delimiter
    /// and any trailing whitespace have been consumed.
    pub handle: JoinHandle<Result<u64, DecodeError>>,
}

/// Starts decoding `reader` on a blocking thread.
///
/// The decoder stops early when `token` is cancelled or when the receiving
/// side is dropped; both are reported as [`DecodeError::Cancelled`].
pub fn spawn_array_decoder<R>(
    reader: R,
    batch_size: usize,
    token: CancellationToken,
) -> DecodedBatches
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let handle = tokio::task::spawn_blocking(move || decode_array(reader, batch_size, tx, token));
    DecodedBatches {
        batches: rx,
        handle,
    }
}

fn decode_array<R: Read>(
    reader: R,
    batch_size: usize,
    tx: mpsc::Sender<Vec<Value>>,
    token: CancellationToken,
) -> Result<u64, DecodeError> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let visitor = BatchingVisitor {
        tx,
        batch_size: batch_size.max(1),
        token: token.clone(),
    };

    let classify = |e: serde_json::Error| {
        if token.is_cancelled() || e.to_string().starts_with(STOP_MARKER) {
            DecodeError::Cancelled
        } else if e.is_io() {
            DecodeError::Io(e.to_string())
        } else {
            DecodeError::Framing(e.to_string())
        }
    };

    let count = (&mut de).deserialize_seq(visitor).map_err(classify)?;
    de.end().map_err(classify)?;
    Ok(count)
}

struct BatchingVisitor {
    tx: mpsc::Sender<Vec<Value>>,
    batch_size: usize,
    token: CancellationToken,
}

impl BatchingVisitor {
    fn send<E: de::Error>(&self, batch: Vec<Value>) -> Result<(), E> {
        self.tx
            .blocking_send(batch)
            .map_err(|_| E::custom(STOP_MARKER))
    }
}

impl<'de> Visitor<'de> for BatchingVisitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON array of records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<u64, A::Error> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut count = 0u64;

        loop {
            if self.token.is_cancelled() {
                return Err(de::Error::custom(STOP_MARKER));
            }
            match seq.next_element::<Value>()? {
                Some(element) => {
                    batch.push(element);
                    count += 1;
                    if batch.len() >= self.batch_size {
                        let full =
                            std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                        self.send(full)?;
                    }
                }
                None => break,
            }
        }

        if !batch.is_empty() {
            self.send(batch)?;
        }
        Ok(count)
    }
}
