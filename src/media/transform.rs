// SPDX-License-Identifier: GPL-3.0-only

//! Orientation and sampling transforms
//!
//! A [`FrameTransform`] maps normalized output coordinates (0..1, origin top
//! left) to normalized source coordinates. Filter units sample their input
//! through it, which covers source orientation, mirroring and the
//! scale-to-fill crop in one step.

use std::fmt;

/// Clockwise rotation needed to display a source upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Create rotation from an integer degree value (normalised to 0-360)
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Rotate90,
            180 => Rotation::Rotate180,
            270 => Rotation::Rotate270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Orientation of a media source: rotation plus optional horizontal mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaTransform {
    pub rotation: Rotation,
    pub mirrored: bool,
}

impl MediaTransform {
    pub fn new(rotation: Rotation, mirrored: bool) -> Self {
        Self { rotation, mirrored }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::None && !self.mirrored
    }

    /// True when the upright image is portrait while the stored one is not
    pub fn switches_dimensions(&self) -> bool {
        self.rotation.swaps_dimensions()
    }

    /// Sampling transform from upright output coordinates into the stored frame
    ///
    /// Display order is mirror first, then rotate, so sampling undoes the
    /// rotation before the mirror.
    pub fn to_frame_transform(&self) -> FrameTransform {
        let rotate = FrameTransform::rotation(self.rotation);
        if self.mirrored {
            rotate.followed_by(FrameTransform::mirror())
        } else {
            rotate
        }
    }

    /// Parse a GStreamer `image-orientation` tag value such as `flip-rotate-90`
    pub fn from_orientation_tag(tag: &str) -> Self {
        let (mirrored, rotation) = match tag.strip_prefix("flip-") {
            Some(rest) => (true, rest),
            None => (false, tag),
        };
        let degrees = rotation
            .strip_prefix("rotate-")
            .and_then(|d| d.parse::<i32>().ok())
            .unwrap_or(0);
        Self::new(Rotation::from_degrees(degrees), mirrored)
    }
}

/// 2x3 affine map on normalized coordinates
///
/// `src = (a*u + c*v + tx, b*u + d*v + ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FrameTransform {
    pub const IDENTITY: FrameTransform = FrameTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn rotation(rotation: Rotation) -> Self {
        match rotation {
            Rotation::None => Self::IDENTITY,
            // upright (u, v) comes from stored (v, 1 - u)
            Rotation::Rotate90 => Self {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                tx: 0.0,
                ty: 1.0,
            },
            Rotation::Rotate180 => Self {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                tx: 1.0,
                ty: 1.0,
            },
            // upright (u, v) comes from stored (1 - v, u)
            Rotation::Rotate270 => Self {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                tx: 1.0,
                ty: 0.0,
            },
        }
    }

    /// Horizontal flip
    pub fn mirror() -> Self {
        Self {
            a: -1.0,
            tx: 1.0,
            ..Self::IDENTITY
        }
    }

    /// Sample only the normalized rectangle at (x, y) with size (w, h)
    pub fn crop(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            a: w,
            b: 0.0,
            c: 0.0,
            d: h,
            tx: x,
            ty: y,
        }
    }

    /// Apply `self` first, then `next`
    pub fn followed_by(self, next: FrameTransform) -> FrameTransform {
        FrameTransform {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            tx: next.a * self.tx + next.c * self.ty + next.tx,
            ty: next.b * self.tx + next.d * self.ty + next.ty,
        }
    }

    /// Map a normalized output coordinate to a normalized source coordinate
    #[inline]
    pub fn apply(&self, u: f32, v: f32) -> (f32, f32) {
        (
            self.a * u + self.c * v + self.tx,
            self.b * u + self.d * v + self.ty,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Column-major rows for a WGSL uniform: (a, b, c, d) and (tx, ty, 0, 0)
    pub fn to_uniform(&self) -> [[f32; 4]; 2] {
        [[self.a, self.b, self.c, self.d], [self.tx, self.ty, 0.0, 0.0]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(p: (f32, f32), q: (f32, f32)) -> bool {
        (p.0 - q.0).abs() < 1e-6 && (p.1 - q.1).abs() < 1e-6
    }

    #[test]
    fn test_rotate90_maps_top_right_to_stored_origin() {
        let t = FrameTransform::rotation(Rotation::Rotate90);
        assert!(approx(t.apply(1.0, 0.0), (0.0, 0.0)));
        assert!(approx(t.apply(0.0, 0.0), (0.0, 1.0)));
    }

    #[test]
    fn test_rotations_compose_to_full_turn() {
        let quarter = FrameTransform::rotation(Rotation::Rotate90);
        let full = quarter
            .followed_by(quarter)
            .followed_by(quarter)
            .followed_by(quarter);
        assert!(approx(full.apply(0.25, 0.75), (0.25, 0.75)));
    }

    #[test]
    fn test_crop_then_mirror() {
        let t = FrameTransform::crop(0.25, 0.0, 0.5, 1.0).followed_by(FrameTransform::mirror());
        // left edge of the crop lands on the mirrored right side
        assert!(approx(t.apply(0.0, 0.5), (0.75, 0.5)));
    }

    #[test]
    fn test_orientation_tag_parsing() {
        assert_eq!(
            MediaTransform::from_orientation_tag("rotate-90"),
            MediaTransform::new(Rotation::Rotate90, false)
        );
        assert_eq!(
            MediaTransform::from_orientation_tag("flip-rotate-180"),
            MediaTransform::new(Rotation::Rotate180, true)
        );
        assert!(MediaTransform::from_orientation_tag("garbage").is_identity());
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Rotation::Rotate270);
        assert_eq!(Rotation::from_degrees(450), Rotation::Rotate90);
        assert!(Rotation::Rotate270.swaps_dimensions());
    }
}
