//! Unit conversions between source material/light parameters and Mitsuba's
//!
//! | source                         | target                                  |
//! |--------------------------------|-----------------------------------------|
//! | Phong exponent `Ns`            | Beckmann `alpha = sqrt(2 / (Ns + 2))`   |
//! | microfacet `alpha`             | principled `roughness = sqrt(alpha)`    |
//! | glossiness `g`                 | roughness `1 - g`, `alpha = roughness²` |
//! | transparency `Tr`              | opacity `1 - Tr`                        |
//! | candela / lux                  | W/sr / W/m² by `/ 683`                  |

/// Luminous efficacy of 555 nm light, lm/W
pub const LUMINOUS_EFFICACY: f32 = 683.0;

/// Beckmann alpha matching a Phong lobe with exponent `ns`
pub fn ns_to_alpha(ns: f32) -> f32 {
    (2.0 / (ns.max(0.0) + 2.0)).sqrt()
}

/// Perceptual roughness for a microfacet alpha
pub fn alpha_to_roughness(alpha: f32) -> f32 {
    alpha.clamp(0.0, 1.0).sqrt()
}

pub fn roughness_to_alpha(roughness: f32) -> f32 {
    let r = roughness.clamp(0.0, 1.0);
    r * r
}

pub fn glossiness_to_roughness(glossiness: f32) -> f32 {
    1.0 - glossiness.clamp(0.0, 1.0)
}

/// MTL `Tr` (transparency) to opacity
pub fn transparency_to_opacity(tr: f32) -> f32 {
    1.0 - tr.clamp(0.0, 1.0)
}

/// Photometric light intensity to Mitsuba's radiometric units
pub fn photometric_to_radiometric(value: f32, scale: f32) -> f32 {
    value / LUMINOUS_EFFICACY * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_ns_to_alpha() {
        assert!(close(ns_to_alpha(0.0), 1.0));
        assert!(close(ns_to_alpha(198.0), 0.1));
        assert!(close(ns_to_alpha(-5.0), 1.0));
    }

    #[test]
    fn test_roughness_round_trip() {
        let alpha = roughness_to_alpha(0.5);
        assert!(close(alpha, 0.25));
        assert!(close(alpha_to_roughness(alpha), 0.5));
    }

    #[test]
    fn test_glossiness_and_transparency() {
        assert!(close(glossiness_to_roughness(0.75), 0.25));
        assert!(close(transparency_to_opacity(0.25), 0.75));
    }

    #[test]
    fn test_photometric() {
        assert!(close(photometric_to_radiometric(683.0, 1.0), 1.0));
        assert!(close(photometric_to_radiometric(683.0, 2.0), 2.0));
    }
}
