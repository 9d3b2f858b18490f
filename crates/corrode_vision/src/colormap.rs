//! Jet color palette.
//!
//! Maps 8-bit intensities from dark blue (0) through cyan, yellow and red to
//! dark red (255).

use image::Rgb;

/// Color for an intensity in `[0, 1]`; values outside are clamped.
pub fn jet_f32(v: f32) -> [f32; 3] {
    let v = v.clamp(0.0, 1.0);
    let channel = |center: f32| (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Color for an 8-bit intensity.
pub fn jet(level: u8) -> Rgb<u8> {
    let [r, g, b] = jet_f32(f32::from(level) / 255.0);
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// The full 256-entry palette.
pub fn jet_lut() -> [Rgb<u8>; 256] {
    let mut lut = [Rgb([0, 0, 0]); 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = jet(i as u8);
    }
    lut
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(jet(0), Rgb([0, 0, 128]));
        assert_eq!(jet(255), Rgb([128, 0, 0]));
    }

    #[test]
    fn test_midpoint_is_green_dominant() {
        let Rgb([r, g, b]) = jet(128);
        assert_eq!(g, 255);
        assert!(r > 100 && b > 100);
    }

    #[test]
    fn test_lut_matches_jet() {
        let lut = jet_lut();
        for i in [0u8, 17, 64, 200, 255] {
            assert_eq!(lut[i as usize], jet(i));
        }
    }
}
