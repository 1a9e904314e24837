// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel effect kernels
//!
//! These functions are the CPU rendition of `filters.wgsl`; both use the same
//! kernel codes and the same math so the backends stay visually aligned.
//! Every kernel works on normalized coordinates (0..1) and float colors.

use crate::media::PixelBuffer;
use std::f32::consts::PI;

/// Identity kernel (passthrough and off)
pub const KERNEL_IDENTITY: u32 = 0;

/// Source over overlay composite used by alpha-blend units
pub const KERNEL_ALPHA_BLEND: u32 = 100;

const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

#[inline]
pub fn luminance(c: [f32; 4]) -> f32 {
    LUMA[0] * c[0] + LUMA[1] * c[1] + LUMA[2] * c[2]
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Cheap deterministic noise in 0..1
#[inline]
pub fn hash(x: f32, y: f32) -> f32 {
    let h = (x * 127.1 + y * 311.7).sin() * 43_758.547;
    h - h.floor()
}

#[inline]
fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

#[inline]
fn clamp_color(c: [f32; 4]) -> [f32; 4] {
    [
        c[0].clamp(0.0, 1.0),
        c[1].clamp(0.0, 1.0),
        c[2].clamp(0.0, 1.0),
        c[3].clamp(0.0, 1.0),
    ]
}

/// Bilinear sample of an RGBA buffer at normalized coordinates (clamped to edge)
pub fn sample_bilinear(buffer: &PixelBuffer, u: f32, v: f32) -> [f32; 4] {
    let w = buffer.width();
    let h = buffer.height();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let fx = (u.clamp(0.0, 1.0) * w as f32 - 0.5).max(0.0);
    let fy = (v.clamp(0.0, 1.0) * h as f32 - 0.5).max(0.0);
    let x0 = (fx.floor() as u32).min(w - 1);
    let y0 = (fy.floor() as u32).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let data = buffer.data();
    let stride = buffer.stride();
    let texel = |x: u32, y: u32| -> [f32; 4] {
        let i = y as usize * stride + x as usize * 4;
        [
            data[i] as f32 / 255.0,
            data[i + 1] as f32 / 255.0,
            data[i + 2] as f32 / 255.0,
            data[i + 3] as f32 / 255.0,
        ]
    };

    let top = mix(texel(x0, y0), texel(x1, y0), tx);
    let bottom = mix(texel(x0, y1), texel(x1, y1), tx);
    mix(top, bottom, ty)
}

/// Coordinate warp applied before sampling
pub fn warp(code: u32, u: f32, v: f32, time: f32, aspect: f32) -> (f32, f32) {
    match code {
        // wave pool
        1 => (
            u + 0.008 * (v * 28.0 + time * 3.0).sin(),
            v + 0.008 * (u * 28.0 + time * 2.5).cos(),
        ),
        // em interference: random horizontal band shifts
        3 => {
            let band = (v * 24.0).floor();
            let tick = (time * 8.0).floor();
            let n = hash(band, tick);
            let shift = if n > 0.75 { (n - 0.875) * 0.4 } else { 0.0 };
            (u + shift, v)
        }
        // lego: snap to brick centers
        5 => {
            let cols = 48.0;
            let rows = (cols / aspect.max(1e-3)).max(1.0);
            (
                ((u * cols).floor() + 0.5) / cols,
                ((v * rows).floor() + 0.5) / rows,
            )
        }
        // mirror 2: left half reflected onto the right
        8 => (if u > 0.5 { 1.0 - u } else { u }, v),
        // mirror 4: top-left quadrant reflected into all four
        9 => (
            if u > 0.5 { 1.0 - u } else { u },
            if v > 0.5 { 1.0 - v } else { v },
        ),
        _ => (u, v),
    }
}

/// Rotate hue by `angle` radians (YIQ rotation)
fn hue_rotate(c: [f32; 4], angle: f32) -> [f32; 4] {
    let y = 0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2];
    let i = 0.596 * c[0] - 0.274 * c[1] - 0.322 * c[2];
    let q = 0.211 * c[0] - 0.523 * c[1] + 0.312 * c[2];
    let (s, co) = angle.sin_cos();
    let i2 = i * co - q * s;
    let q2 = i * s + q * co;
    [
        y + 0.956 * i2 + 0.621 * q2,
        y - 0.272 * i2 - 0.647 * q2,
        y - 1.106 * i2 + 1.703 * q2,
        c[3],
    ]
}

/// Shade one output pixel
///
/// `sample` reads the (already transformed) input at normalized coordinates.
/// `u`/`v` are the normalized output coordinates, `aspect` is output width
/// over height.
pub fn shade<S>(code: u32, sample: &S, u: f32, v: f32, time: f32, aspect: f32) -> [f32; 4]
where
    S: Fn(f32, f32) -> [f32; 4],
{
    let (wu, wv) = warp(code, u, v, time, aspect);
    let base = sample(wu, wv);

    let color = match code {
        // plasma
        2 => {
            let p = (u * 10.0 + time).sin()
                + (v * 10.0 + time * 1.3).sin()
                + ((u + v) * 10.0 + time * 0.7).sin();
            let plasma = [
                0.5 + 0.5 * (p * PI).sin(),
                0.5 + 0.5 * (p * PI + 2.0).sin(),
                0.5 + 0.5 * (p * PI + 4.0).sin(),
                1.0,
            ];
            let l = luminance(base);
            let tinted = [plasma[0] * l, plasma[1] * l, plasma[2] * l, base[3]];
            mix(base, tinted, 0.6)
        }
        // em interference: scanlines and noise on shifted bands
        3 => {
            let scan = 0.85 + 0.15 * (v * 600.0).sin();
            let noise = hash(u * 97.0, v * 53.0 + time) * 0.12;
            [
                base[0] * scan + noise,
                base[1] * scan + noise,
                base[2] * scan + noise,
                base[3],
            ]
        }
        // rgb split
        4 => {
            let r = sample(wu + 0.012, wv);
            let b = sample(wu - 0.012, wv);
            [r[0], base[1], b[2], base[3]]
        }
        // lego studs
        5 => {
            let cols = 48.0;
            let rows = (cols / aspect.max(1e-3)).max(1.0);
            let lx = (u * cols).fract() - 0.5;
            let ly = (v * rows).fract() - 0.5;
            let stud = 1.0 + 0.12 * (1.0 - smoothstep(0.25, 0.32, (lx * lx + ly * ly).sqrt()));
            let edge = if lx.abs() > 0.45 || ly.abs() > 0.45 {
                0.8
            } else {
                1.0
            };
            let k = stud * edge;
            [base[0] * k, base[1] * k, base[2] * k, base[3]]
        }
        // chroma: breathing vertical channel offset
        6 => {
            let amount = 0.006 * (1.0 + (time * 2.0).sin());
            let r = sample(wu, wv - amount);
            let b = sample(wu, wv + amount);
            [r[0], base[1], b[2], base[3]]
        }
        // rave: hue cycles over time and across the frame
        7 => {
            let boosted = [
                (base[0] - 0.5) * 1.3 + 0.5,
                (base[1] - 0.5) * 1.3 + 0.5,
                (base[2] - 0.5) * 1.3 + 0.5,
                base[3],
            ];
            hue_rotate(boosted, time * 3.0 + (u + v) * PI)
        }
        // light leaks: warm glow drifting across the frame
        10 => {
            let cx = 0.5 + 0.4 * (time * 0.5).sin();
            let cy = 0.3 + 0.3 * (time * 0.7).cos();
            let dx = (u - cx) * aspect;
            let dy = v - cy;
            let glow = 1.0 - smoothstep(0.0, 0.8, (dx * dx + dy * dy).sqrt());
            let edge = smoothstep(0.6, 1.0, u) * 0.5;
            let k = glow * 0.55 + edge * 0.3;
            [
                base[0] + k,
                base[1] + k * 0.55,
                base[2] + k * 0.25,
                base[3],
            ]
        }
        // film: warm tone, grain, vignette, flicker
        11 => {
            let l = luminance(base);
            let toned = [l * 1.1 + 0.05, l * 0.95 + 0.03, l * 0.8, base[3]];
            let graded = mix(base, toned, 0.7);
            let grain = (hash(u * 431.0, v * 337.0 + time.fract()) - 0.5) * 0.1;
            let dx = u - 0.5;
            let dy = v - 0.5;
            let vignette = 1.0 - smoothstep(0.35, 0.85, (dx * dx + dy * dy).sqrt());
            let flicker = 0.97 + 0.03 * (time * 23.0).sin();
            let k = vignette * flicker;
            [
                (graded[0] + grain) * k,
                (graded[1] + grain) * k,
                (graded[2] + grain) * k,
                base[3],
            ]
        }
        // grayscale
        12 => {
            let l = luminance(base);
            [l, l, l, base[3]]
        }
        // manga: halftone dots
        13 => {
            let cells = 90.0;
            let rows = cells / aspect.max(1e-3);
            let lx = (u * cells).fract() - 0.5;
            let ly = (v * rows).fract() - 0.5;
            let darkness = 1.0 - luminance(base);
            let radius = darkness.sqrt() * 0.7;
            let ink = if (lx * lx + ly * ly).sqrt() < radius || darkness > 0.85 {
                0.0
            } else {
                1.0
            };
            [ink, ink, ink, base[3]]
        }
        // toon: posterize with dark outlines
        14 => {
            let levels = 4.0;
            let step = 1.5 / 512.0;
            let gx = luminance(sample(wu + step, wv)) - luminance(sample(wu - step, wv));
            let gy = luminance(sample(wu, wv + step)) - luminance(sample(wu, wv - step));
            let edge = if (gx * gx + gy * gy).sqrt() > 0.2 {
                0.0
            } else {
                1.0
            };
            [
                (base[0] * levels).floor() / levels * edge,
                (base[1] * levels).floor() / levels * edge,
                (base[2] * levels).floor() / levels * edge,
                base[3],
            ]
        }
        _ => base,
    };

    clamp_color(color)
}

/// Composite `overlay` over `source` by the overlay's alpha
#[inline]
pub fn alpha_blend(source: [f32; 4], overlay: [f32; 4]) -> [f32; 4] {
    let a = overlay[3];
    clamp_color([
        source[0] * (1.0 - a) + overlay[0] * a,
        source[1] * (1.0 - a) + overlay[1] * a,
        source[2] * (1.0 - a) + overlay[2] * a,
        a + source[3] * (1.0 - a),
    ])
}

#[inline]
pub fn to_rgba8(c: [f32; 4]) -> [u8; 4] {
    [
        (c[0] * 255.0 + 0.5) as u8,
        (c[1] * 255.0 + 0.5) as u8,
        (c[2] * 255.0 + 0.5) as u8,
        (c[3] * 255.0 + 0.5) as u8,
    ]
}
