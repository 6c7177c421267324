use hearsay_core::{AudioChunk, AudioConfig};

/// Tuning for trailing-silence detection.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// RMS level below which a chunk counts as silence.
    pub silence_threshold: f32,

    /// Speech must run at least this long before silence can end the
    /// utterance.
    pub min_speech_ms: u64,

    /// Trailing silence required to end the utterance.
    pub min_silence_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.015,
            min_speech_ms: 200,
            min_silence_ms: 800,
        }
    }
}

impl From<&AudioConfig> for EndpointConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            silence_threshold: audio.silence_threshold,
            min_speech_ms: audio.min_speech_ms,
            min_silence_ms: audio.min_silence_ms,
        }
    }
}

/// Detects the end of an utterance from trailing silence.
///
/// Leading silence is ignored: silence only starts counting once enough
/// speech has been heard. Progress is measured in sample frames, so the
/// outcome does not depend on capture buffer sizing or wall-clock time.
#[derive(Debug)]
pub struct EndOfSpeechDetector {
    config: EndpointConfig,
    sample_rate: u32,
    speech_frames: u64,
    silence_frames: u64,
    ended: bool,
}

impl EndOfSpeechDetector {
    pub fn new(config: EndpointConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            speech_frames: 0,
            silence_frames: 0,
            ended: false,
        }
    }

    /// Feed one captured chunk. Returns true once trailing silence has
    /// run long enough; later chunks keep returning true until `reset`.
    pub fn observe(&mut self, chunk: &AudioChunk) -> bool {
        if self.ended {
            return true;
        }

        let channels = chunk.channels.max(1) as u64;
        let frames = chunk.samples.len() as u64 / channels;

        if rms(&chunk.samples) >= self.config.silence_threshold {
            self.speech_frames += frames;
            self.silence_frames = 0;
        } else if self.heard_speech() {
            self.silence_frames += frames;
        }

        if self.heard_speech()
            && self.silence_frames >= self.frames_for(self.config.min_silence_ms)
        {
            self.ended = true;
        }
        self.ended
    }

    /// Whether enough speech has been heard to arm silence counting.
    pub fn heard_speech(&self) -> bool {
        self.speech_frames >= self.frames_for(self.config.min_speech_ms)
    }

    pub fn reset(&mut self) {
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.ended = false;
    }

    fn frames_for(&self, ms: u64) -> u64 {
        self.sample_rate as u64 * ms / 1000
    }
}

/// Root mean square level of a sample block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
