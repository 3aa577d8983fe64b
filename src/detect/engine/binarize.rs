use anyhow::{Result, ensure};
use image::{GrayImage, Luma};

pub(super) const FOREGROUND: u8 = 255;
pub(super) const BACKGROUND: u8 = 0;

/// Inverted adaptive threshold: a pixel is foreground when it is at least
/// `offset` darker than the Gaussian-weighted mean of its
/// `block_size` x `block_size` neighbourhood. Borders replicate edge pixels.
pub(super) fn adaptive_gaussian_inv(
    gray: &GrayImage,
    block_size: u32,
    offset: i32,
) -> Result<GrayImage> {
    ensure!(
        block_size >= 3 && block_size % 2 == 1,
        "adaptive block size must be odd and >= 3 (got {})",
        block_size
    );
    let mean = gaussian_mean(gray, block_size);
    Ok(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let src = gray.get_pixel(x, y)[0] as i32;
        let local = mean.get_pixel(x, y)[0] as i32;
        if src <= local - offset {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    }))
}

/// Inverted global threshold at the Otsu level.
pub(super) fn otsu_inv(gray: &GrayImage) -> GrayImage {
    if is_uniform(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    let level = otsu_level(&histogram(gray));
    threshold_inv(gray, level)
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for pixel in gray.pixels() {
        bins[pixel[0] as usize] += 1;
    }
    bins
}

/// Level maximising the between-class variance; pixels `<= level` form the
/// dark class. Accumulates in u64/f64 so multi-megapixel pages cannot overflow.
fn otsu_level(bins: &[u64; 256]) -> u8 {
    let total: u64 = bins.iter().sum();
    let weighted_total: f64 = bins
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut dark_weight = 0u64;
    let mut dark_sum = 0f64;
    let mut best_variance = 0f64;
    let mut level = 0u8;

    for (value, &count) in bins.iter().enumerate() {
        dark_weight += count;
        if dark_weight == 0 {
            continue;
        }
        let light_weight = total - dark_weight;
        if light_weight == 0 {
            break;
        }
        dark_sum += value as f64 * count as f64;
        let dark_mean = dark_sum / dark_weight as f64;
        let light_mean = (weighted_total - dark_sum) / light_weight as f64;
        let variance =
            dark_weight as f64 * light_weight as f64 * (dark_mean - light_mean).powi(2);
        if variance > best_variance {
            best_variance = variance;
            level = value as u8;
        }
    }
    level
}

fn threshold_inv(gray: &GrayImage, level: u8) -> GrayImage {
    let mut output = gray.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] <= level {
            FOREGROUND
        } else {
            BACKGROUND
        };
    }
    output
}

fn is_uniform(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|pixel| pixel[0] == first[0]),
        None => true,
    }
}

fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let mut weights = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect::<Vec<_>>();
    let sum: f32 = weights.iter().sum();
    for weight in &mut weights {
        *weight /= sum;
    }
    weights
}

fn gaussian_mean(gray: &GrayImage, size: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let kernel = gaussian_kernel(size);
    let radius = (size / 2) as isize;
    let src = gray.as_raw();

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - radius).clamp(0, w as isize - 1) as usize;
                acc += row[sx] as f32 * weight;
            }
            horizontal[y * w + x] = acc;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let mut acc = 0f32;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = (y as isize + k as isize - radius).clamp(0, h as isize - 1) as usize;
            acc += horizontal[sy * w + x] * weight;
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}
