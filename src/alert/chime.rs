use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;

/// Two short rising tones, mono. Finite, so the sink drains on its own.
pub struct MatchChime {
    tones: [f32; 2],
    tone_samples: usize,
    num_sample: usize,
}

impl MatchChime {
    pub fn new() -> Self {
        Self {
            tones: [880.0, 1320.0],
            tone_samples: (SAMPLE_RATE as usize * 180) / 1000,
            num_sample: 0,
        }
    }

    fn total_samples(&self) -> usize {
        self.tone_samples * self.tones.len()
    }
}

impl Iterator for MatchChime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples() {
            return None;
        }

        let tone = self.tones[self.num_sample / self.tone_samples];
        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        let within = (self.num_sample % self.tone_samples) as f32 / self.tone_samples as f32;
        // Linear fade out per tone to avoid clicks.
        let envelope = 1.0 - within;
        self.num_sample += 1;

        Some((2.0 * PI * tone * t).sin() * envelope * 0.3)
    }
}

impl Source for MatchChime {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples() - self.num_sample.min(self.total_samples()))
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(180 * self.tones.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chime_is_finite_and_bounded() {
        let chime = MatchChime::new();
        let expected = chime.total_samples();
        let samples: Vec<f32> = chime.collect();
        assert_eq!(samples.len(), expected);
        assert!(samples.iter().all(|s| s.abs() <= 0.3));
    }
}
