// Lattice value noise and fractal Brownian motion.
//
// `value_noise` hashes the four integer corners around a sample point and
// bilinearly interpolates them with a smoothstep fade, giving a continuous
// field in [0, 1). `fbm` sums octaves of it — each octave doubles the
// frequency and halves the amplitude — and normalizes by the total amplitude
// so the result stays in [0, 1) regardless of octave count.
//
// Everything bottoms out in `hash::hash_unit`, so the fields are pure
// functions of `(seed, salt, position)` and bit-stable across restarts.

use crate::hash::hash_unit;

/// Quintic smoothstep fade, C2-continuous at the lattice corners.
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Bilinear-interpolated lattice value noise in [0, 1).
pub fn value_noise(seed: u64, salt: u64, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let xi = x0 as i32;
    let yi = y0 as i32;
    let tx = fade(x - x0);
    let ty = fade(y - y0);

    let c00 = hash_unit(seed, salt, xi, yi);
    let c10 = hash_unit(seed, salt, xi + 1, yi);
    let c01 = hash_unit(seed, salt, xi, yi + 1);
    let c11 = hash_unit(seed, salt, xi + 1, yi + 1);

    lerp(lerp(c00, c10, tx), lerp(c01, c11, tx), ty)
}

/// Fractal Brownian motion: `octaves` layers of value noise at successively
/// doubled frequency and halved amplitude, normalized by the total amplitude.
pub fn fbm(seed: u64, salt: u64, x: f64, y: f64, octaves: u32, base_frequency: f64) -> f64 {
    let mut sum = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = base_frequency;
    let mut total = 0.0;

    for octave in 0..octaves {
        // Offset each octave's salt so layers are uncorrelated.
        let layer_salt = salt.wrapping_add(u64::from(octave).wrapping_mul(0x9e37));
        sum += amplitude * value_noise(seed, layer_salt, x * frequency, y * frequency);
        total += amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }

    sum / total
}
