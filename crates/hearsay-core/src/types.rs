use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A block of interleaved PCM samples as delivered by a capture callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Sending half of an `AudioStream`. Cloneable; all clones feed the same
/// stream, and `close` ends the feed for every clone at once.
#[derive(Debug, Clone)]
pub struct AudioFeed {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>>,
}

impl AudioFeed {
    /// Queue one chunk. Chunks sent after the feed has closed are dropped.
    pub fn send(&self, chunk: AudioChunk) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(chunk);
        }
    }

    /// End the feed. The consumer sees any chunks still queued, then the
    /// end of the stream.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

/// A live feed of audio chunks. Produced by a capture node (or a test
/// fixture), consumed exactly once by a voice query.
///
/// The feed ends when `AudioFeed::close` is called or every `AudioFeed`
/// clone is dropped; a voice query treats that as end of utterance.
#[derive(Debug)]
pub struct AudioStream {
    format: AudioFormat,
    rx: mpsc::UnboundedReceiver<AudioChunk>,
}

impl AudioStream {
    pub fn channel(format: AudioFormat) -> (AudioFeed, AudioStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = AudioFeed {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (feed, AudioStream { format, rx })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Receive the next chunk, or `None` once the producer has finished.
    pub async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }

    pub fn into_parts(self) -> (AudioFormat, mpsc::UnboundedReceiver<AudioChunk>) {
        (self.format, self.rx)
    }
}
