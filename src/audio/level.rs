//! Presentation level handling
//!
//! A level in dB scales the clip by `10^(dB/20)`. Without a level the clip
//! is DC-corrected and peak-normalised per channel, then divided by the
//! channel count so the summed output stays within full scale.

use super::AudioClip;
use crate::error::AudioError;

/// Peak magnitude above which a scaled clip is rejected
pub const CLIP_THRESHOLD: f32 = 0.999;

/// Convert decibels to linear magnitude
pub fn db_to_mag(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert linear magnitude to decibels
pub fn mag_to_db(mag: f64) -> f64 {
    20.0 * mag.log10()
}

/// Root mean square of a signal
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Apply a presentation level (or normalise) in place
pub fn apply_level(clip: &mut AudioClip, level: Option<f64>) -> Result<(), AudioError> {
    match level {
        Some(db) => {
            let mag = db_to_mag(db) as f32;
            for s in clip.samples.iter_mut() {
                *s *= mag;
            }

            let peak = peak(&clip.samples);
            if peak > CLIP_THRESHOLD {
                return Err(AudioError::Clipping { peak });
            }
        }
        None => normalize(clip),
    }
    Ok(())
}

fn normalize(clip: &mut AudioClip) {
    let channels = clip.channels.max(1) as usize;
    let frames = clip.frames();
    if frames == 0 {
        return;
    }

    for ch in 0..channels {
        let mean: f64 = (0..frames)
            .map(|f| clip.samples[f * channels + ch] as f64)
            .sum::<f64>()
            / frames as f64;

        let mut max = 0.0f32;
        for f in 0..frames {
            let s = &mut clip.samples[f * channels + ch];
            *s -= mean as f32;
            max = max.max(s.abs());
        }

        // Silent channel stays silent
        if max <= f32::EPSILON {
            continue;
        }
        let scale = 1.0 / (max * channels as f32);
        for f in 0..frames {
            clip.samples[f * channels + ch] *= scale;
        }
    }
}

/// Keep only the first `outputs` channels of each frame
pub fn fit_channels(clip: &AudioClip, outputs: u16) -> Vec<f32> {
    let channels = clip.channels.max(1) as usize;
    let outputs = (outputs as usize).clamp(1, channels);
    if outputs == channels {
        return clip.samples.clone();
    }

    clip.samples
        .chunks_exact(channels)
        .flat_map(|frame| frame[..outputs].iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert!((db_to_mag(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_mag(-20.0) - 0.1).abs() < 1e-12);
        assert!((mag_to_db(0.1) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_level_scales() {
        let mut clip = AudioClip::new(vec![0.5, -0.5, 0.25, -0.25], 48000, 1);
        apply_level(&mut clip, Some(-20.0)).unwrap();
        assert!((clip.samples[0] - 0.05).abs() < 1e-6);
        assert!((clip.samples[3] + 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_apply_level_clipping() {
        let mut clip = AudioClip::new(vec![0.5, -0.9], 48000, 1);
        let err = apply_level(&mut clip, Some(6.0)).unwrap_err();
        assert!(matches!(err, AudioError::Clipping { .. }));
    }

    #[test]
    fn test_normalize_stereo() {
        // Left has DC offset, right is silent
        let mut clip = AudioClip::new(vec![1.0, 0.0, 0.5, 0.0, 1.0, 0.0, 0.5, 0.0], 48000, 2);
        apply_level(&mut clip, None).unwrap();

        let left: Vec<f32> = clip.samples.iter().step_by(2).copied().collect();
        let right: Vec<f32> = clip.samples.iter().skip(1).step_by(2).copied().collect();
        assert!((peak(&left) - 0.5).abs() < 1e-6);
        assert!(left.iter().sum::<f32>().abs() < 1e-6);
        assert_eq!(peak(&right), 0.0);
    }

    #[test]
    fn test_fit_channels_drops_extra() {
        let clip = AudioClip::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 48000, 3);
        assert_eq!(fit_channels(&clip, 2), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(fit_channels(&clip, 8), clip.samples);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
    }
}
