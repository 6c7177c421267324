use crate::endpoint::{EndOfSpeechDetector, EndpointConfig};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use hearsay_core::{AudioChunk, AudioConfig, AudioError, AudioFeed, AudioFormat, AudioStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── CaptureHandle ─────────────────────────────────────────────

/// Control surface for a running capture. Cloneable; all clones share
/// the same state.
#[derive(Clone)]
pub struct CaptureHandle {
    stopped: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    feed: AudioFeed,
}

impl CaptureHandle {
    /// End the utterance manually. The audio feed closes immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.feed.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::Relaxed);
        self.feed.close();
    }
}

// ── CaptureNode ───────────────────────────────────────────────

/// Owns a cpal input stream feeding an `AudioStream`. Capture runs until
/// `CaptureHandle::stop`, end-of-utterance detection (when `auto_end` is
/// set), a device failure, or the node is dropped. Each of those closes
/// the feed at once rather than on the next callback.
pub struct CaptureNode {
    _stream: Stream,
    feed: AudioFeed,
}

impl CaptureNode {
    pub fn open(
        device: &Device,
        config: &AudioConfig,
    ) -> Result<(Self, CaptureHandle, AudioStream), AudioError> {
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };
        let format = AudioFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
        };

        let (feed, audio) = AudioStream::channel(format);
        let handle = CaptureHandle {
            stopped: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            feed: feed.clone(),
        };

        let mut detector = config
            .auto_end
            .then(|| EndOfSpeechDetector::new(EndpointConfig::from(config), config.sample_rate));

        let sample_rate = config.sample_rate;
        let channels = config.channels;

        let data_callback = {
            let feed = feed.clone();
            let stopped = Arc::clone(&handle.stopped);
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if feed.is_closed() {
                    return;
                }

                let chunk = AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                };
                let ended = detector
                    .as_mut()
                    .map(|d| d.observe(&chunk))
                    .unwrap_or(false);
                feed.send(chunk);

                if ended {
                    tracing::debug!("end of utterance detected");
                    stopped.store(true, Ordering::Relaxed);
                    feed.close();
                }
            }
        };

        let err_callback = {
            let handle = handle.clone();
            move |err: cpal::StreamError| {
                tracing::error!("capture stream error: {}", err);
                handle.fail();
            }
        };

        let stream = device
            .build_input_stream(&stream_config, data_callback, err_callback, None)
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok((Self { _stream: stream, feed }, handle, audio))
    }
}

impl Drop for CaptureNode {
    fn drop(&mut self) {
        // The stream stops calling back once dropped; end the feed with it
        self.feed.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_capture_handle() -> (CaptureHandle, AudioStream) {
        let (feed, audio) = AudioStream::channel(AudioFormat {
            sample_rate: 16000,
            channels: 1,
        });
        let handle = CaptureHandle {
            stopped: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            feed,
        };
        (handle, audio)
    }

    #[test]
    fn test_capture_handle_starts_running() {
        let (handle, _audio) = make_capture_handle();
        assert!(!handle.is_stopped());
        assert!(!handle.is_failed());
    }

    #[test]
    fn test_capture_handle_clone_shares_state() {
        let (h1, _audio) = make_capture_handle();
        let h2 = h1.clone();
        h1.stop();
        assert!(h2.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_closes_feed_immediately() {
        let (handle, mut audio) = make_capture_handle();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(audio.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_device_failure_closes_feed_immediately() {
        let (handle, mut audio) = make_capture_handle();
        handle.feed.send(AudioChunk {
            samples: vec![0.0; 160],
            sample_rate: 16000,
            channels: 1,
        });

        handle.fail();
        assert!(handle.is_failed());
        assert!(!handle.is_stopped());

        // The chunk captured before the failure is still delivered
        assert!(audio.next_chunk().await.is_some());
        assert!(audio.next_chunk().await.is_none());
    }
}
