use anyhow::{Result, anyhow, ensure};
use image::GrayImage;

use super::binarize::{BACKGROUND, FOREGROUND};

/// Rectangular structuring element anchored at its centre
/// (`width / 2`, `height / 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct RectElement {
    pub(super) width: u32,
    pub(super) height: u32,
}

impl RectElement {
    pub(super) fn new(width: u32, height: u32) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "structuring element must be at least 1x1 (got {}x{})",
            width,
            height
        );
        Ok(Self { width, height })
    }

    fn offsets(len: u32) -> (isize, isize) {
        let anchor = (len / 2) as isize;
        (-anchor, len as isize - 1 - anchor)
    }

    fn reach(&self) -> Reach {
        let (x_lo, x_hi) = Self::offsets(self.width);
        let (y_lo, y_hi) = Self::offsets(self.height);
        Reach {
            x_lo,
            x_hi,
            y_lo,
            y_hi,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Reach {
    x_lo: isize,
    x_hi: isize,
    y_lo: isize,
    y_hi: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Any,
    All,
}

pub(super) fn dilate(binary: &GrayImage, element: RectElement, iterations: u32) -> Result<GrayImage> {
    let mut output = binary.clone();
    for _ in 0..iterations {
        output = rect_filter(&output, element.reach(), Mode::Any)?;
    }
    Ok(output)
}

/// Erosion over the same anchored window as `dilate`; pixels outside the
/// image never erode.
pub(super) fn erode(binary: &GrayImage, element: RectElement) -> Result<GrayImage> {
    rect_filter(binary, element.reach(), Mode::All)
}

/// Dilation then erosion with one anchor. An even side shifts the closed shape
/// one pixel right (or down), as OpenCV's closing does.
pub(super) fn close(binary: &GrayImage, element: RectElement) -> Result<GrayImage> {
    let dilated = dilate(binary, element, 1)?;
    erode(&dilated, element)
}

fn rect_filter(binary: &GrayImage, reach: Reach, mode: Mode) -> Result<GrayImage> {
    let (width, height) = binary.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut flags = binary
        .as_raw()
        .iter()
        .map(|value| (*value != BACKGROUND) as u8)
        .collect::<Vec<_>>();

    let mut line = Vec::with_capacity(w.max(h));
    let mut prefix = Vec::with_capacity(w.max(h) + 1);

    for y in 0..h {
        line.clear();
        line.extend_from_slice(&flags[y * w..(y + 1) * w]);
        sweep(&line, reach.x_lo, reach.x_hi, mode, &mut prefix, |x, value| {
            flags[y * w + x] = value;
        });
    }

    for x in 0..w {
        line.clear();
        line.extend((0..h).map(|y| flags[y * w + x]));
        sweep(&line, reach.y_lo, reach.y_hi, mode, &mut prefix, |y, value| {
            flags[y * w + x] = value;
        });
    }

    let pixels = flags
        .into_iter()
        .map(|flag| if flag == 1 { FOREGROUND } else { BACKGROUND })
        .collect::<Vec<_>>();
    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("morphology buffer does not match {}x{}", width, height))
}

fn sweep(
    line: &[u8],
    lo: isize,
    hi: isize,
    mode: Mode,
    prefix: &mut Vec<u32>,
    mut write: impl FnMut(usize, u8),
) {
    prefix.clear();
    prefix.push(0);
    let mut running = 0u32;
    for flag in line {
        running += *flag as u32;
        prefix.push(running);
    }

    let last = line.len() as isize - 1;
    for i in 0..line.len() {
        let start = (i as isize + lo).max(0);
        let end = (i as isize + hi).min(last);
        if start > end {
            write(i, (mode == Mode::All) as u8);
            continue;
        }
        let count = prefix[end as usize + 1] - prefix[start as usize];
        let hit = match mode {
            Mode::Any => count > 0,
            Mode::All => count as isize == end - start + 1,
        };
        write(i, hit as u8);
    }
}
