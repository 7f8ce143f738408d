use crate::error::{DeepfryError, DeepfryResult};

/// Parameters for the deep-fry pipeline.
///
/// Each control is an independent bounded number owned by the surrounding
/// UI; the pipeline consumes them as-is and clamps its outputs. Defaults
/// match the classic fried look.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FryParams {
    /// Grain strength, 0..100. Amplitude is `noise/100 * 45` per channel.
    pub noise: f64,
    /// Contrast curve parameter, roughly -50..50.
    pub contrast: f64,
    /// Saturation percent; 100 is identity, 0 is grayscale.
    pub saturation: f64,
    /// Unsharp-mask strength, 0..100.
    pub sharpen: f64,
    /// Compression crush, 0..100; drives both pixelation and posterization.
    pub crush: f64,
}

impl Default for FryParams {
    fn default() -> Self {
        Self {
            noise: 35.0,
            contrast: 20.0,
            saturation: 160.0,
            sharpen: 35.0,
            crush: 55.0,
        }
    }
}

impl FryParams {
    /// Identity settings: every stage is a no-op except the fixed warm bias.
    pub fn neutral() -> Self {
        Self {
            noise: 0.0,
            contrast: 0.0,
            saturation: 100.0,
            sharpen: 0.0,
            crush: 0.0,
        }
    }
}

/// Contrast remap factor for a contrast parameter `c`.
pub fn contrast_factor(c: f64) -> f64 {
    (259.0 * (c + 255.0)) / (255.0 * (259.0 - c))
}

/// Posterization quantization step for a crush parameter.
pub fn posterize_step(crush: f64) -> u8 {
    (48i64 - ((crush.max(0.0) / 100.0) * 40.0).floor() as i64).max(6) as u8
}

/// Pixelation block size for a crush parameter.
pub fn pixelate_block(crush: f64) -> usize {
    1 + ((crush.max(0.0) / 100.0) * 10.0).floor() as usize
}

/// Apply the deep-fry pipeline in place to a tightly packed RGBA8 buffer.
///
/// Stage order is fixed: grain, contrast, saturation, warm bias, then (for
/// crush > 0) block pixelation and posterization, then sharpening. The
/// sharpen convolution reads a snapshot taken after quantization so partially
/// sharpened pixels never feed back into neighboring taps. Alpha is never
/// touched and the buffer keeps its dimensions.
///
/// `seed` drives the grain generator; the pipeline is deterministic given
/// buffer, parameters and seed.
pub fn deep_fry(
    data: &mut [u8],
    width: u32,
    height: u32,
    params: &FryParams,
    seed: u64,
) -> DeepfryResult<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| DeepfryError::render("fry buffer size overflows"))?;
    if data.len() != expected {
        return Err(DeepfryError::render(
            "deep_fry expects data matching width*height*4",
        ));
    }
    if width == 0 || height == 0 {
        return Ok(());
    }

    let grain = (params.noise / 100.0) * 45.0;
    let cf = {
        let cf = contrast_factor(params.contrast);
        if cf.is_finite() { cf } else { 1.0 }
    };
    let sat = params.saturation / 100.0;
    let mut rng = Rng64::new(seed);

    for px in data.chunks_exact_mut(4) {
        let mut r = f64::from(px[0]);
        let mut g = f64::from(px[1]);
        let mut b = f64::from(px[2]);

        if grain > 0.0 {
            let n = (rng.next_f64_01() * 2.0 - 1.0) * grain;
            r = clamp255(r + n);
            g = clamp255(g + n);
            b = clamp255(b + n);
        }

        r = clamp255(cf * (r - 128.0) + 128.0);
        g = clamp255(cf * (g - 128.0) + 128.0);
        b = clamp255(cf * (b - 128.0) + 128.0);

        let avg = (r + g + b) / 3.0;
        r = clamp255(avg + (r - avg) * sat);
        g = clamp255(avg + (g - avg) * sat);
        b = clamp255(avg + (b - avg) * sat);

        r = clamp255(r + 12.0);
        g = clamp255(g + 3.0);

        px[0] = r.round() as u8;
        px[1] = g.round() as u8;
        px[2] = b.round() as u8;
    }

    if params.crush > 0.0 {
        pixelate(data, width as usize, height as usize, pixelate_block(params.crush));
        posterize(data, posterize_step(params.crush));
    }

    if params.sharpen > 0.0 {
        sharpen(
            data,
            width as usize,
            height as usize,
            (params.sharpen / 100.0) * 0.8,
        );
    }

    Ok(())
}

/// Flatten each `block`-sized tile to its top-left pixel's RGB.
fn pixelate(data: &mut [u8], w: usize, h: usize, block: usize) {
    if block <= 1 {
        return;
    }
    for by in (0..h).step_by(block) {
        for bx in (0..w).step_by(block) {
            let i0 = (by * w + bx) * 4;
            let (r, g, b) = (data[i0], data[i0 + 1], data[i0 + 2]);
            for y in by..(by + block).min(h) {
                for x in bx..(bx + block).min(w) {
                    let i = (y * w + x) * 4;
                    data[i] = r;
                    data[i + 1] = g;
                    data[i + 2] = b;
                }
            }
        }
    }
}

fn posterize(data: &mut [u8], step: u8) {
    debug_assert!(step > 0);
    for px in data.chunks_exact_mut(4) {
        px[0] = (px[0] / step) * step;
        px[1] = (px[1] / step) * step;
        px[2] = (px[2] / step) * step;
    }
}

/// 5-tap unsharp mask over the interior; border pixels pass through.
fn sharpen(data: &mut [u8], w: usize, h: usize, a: f64) {
    if w < 3 || h < 3 {
        return;
    }
    let snap = data.to_vec();
    let row = w * 4;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = (y * w + x) * 4;
            for c in 0..3 {
                let center = f64::from(snap[idx + c]);
                let around = f64::from(snap[idx - 4 + c])
                    + f64::from(snap[idx + 4 + c])
                    + f64::from(snap[idx - row + c])
                    + f64::from(snap[idx + row + c]);
                let val = (1.0 + 4.0 * a) * center - a * around;
                data[idx + c] = clamp255(val).round() as u8;
            }
        }
    }
}

fn clamp255(v: f64) -> f64 {
    v.clamp(0.0, 255.0)
}

/// SplitMix64 generator for the grain stage.
#[derive(Clone, Copy, Debug)]
pub struct Rng64 {
    state: u64,
}

impl Rng64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub fn next_f64_01(&mut self) -> f64 {
        // 53 bits of precision.
        let v = self.next_u64() >> 11;
        (v as f64) * (1.0 / ((1u64 << 53) as f64))
    }
}
