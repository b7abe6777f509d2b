//! Output device discovery and selection.
//!
//! Thin wrappers around cpal for listing output devices and selecting
//! either the default device or one by case-insensitive substring match.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device matching `needle` (case-insensitive), or
/// the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the best supported output config for a target sample rate.
///
/// Prefers the exact target when a range covers it; otherwise the nearest
/// supported rate, favoring rates at or above the target so the resampler
/// upsamples rather than discards bandwidth. Ties break on sample format
/// (f32 first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let at_or_above = rate >= target_rate;
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_above, b_rate, b_rank, _)) => {
                is_better_candidate(at_or_above, rate, rank, target_rate, *b_above, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((at_or_above, rate, rank, range.with_sample_rate(rate)));
        }
    }

    Ok(best.unwrap().3)
}

/// Prefer a fixed buffer size when the device advertises a range.
///
/// Returns `None` when only the default buffer size is supported.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout (`devices` subcommand).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    if target >= min && target <= max {
        target
    } else if target < min {
        min
    } else {
        max
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    at_or_above: bool,
    rate: u32,
    rank: u8,
    target: u32,
    best_above: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if at_or_above != best_above {
        return at_or_above;
    }
    let dist = rate.abs_diff(target);
    let best_dist = best_rate.abs_diff(target);
    if dist != best_dist {
        return dist < best_dist;
    }
    rank < best_rank
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
