// Deterministic coordinate hashing.
//
// A SplitMix64-style avalanche over `(seed, salt, x, y)`. This is the single
// source of per-tile randomness for the whole terrain generator — the
// threshold classifier hashes tile coordinates directly, and the value-noise
// lattice hashes its integer corners. No external RNG crates, no
// floating-point inside the hash path.
//
// **Critical constraint: determinism.** Identical inputs must yield identical
// output on every platform, compiler version, and process restart. Keep this
// to wrapping integer arithmetic only.

/// SplitMix64 finalizer. Full avalanche: every input bit affects every
/// output bit.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Hash a lattice coordinate under a seed and a salt.
///
/// The salt separates independent fields drawn from the same seed (elevation
/// vs. moisture vs. scatter) so they are uncorrelated.
pub fn hash_coords(seed: u64, salt: u64, x: i32, y: i32) -> u64 {
    let mut h = seed ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h = mix(h ^ u64::from(x as u32).wrapping_mul(0xd6e8_feb8_6659_fd93));
    h = mix(h ^ u64::from(y as u32).wrapping_mul(0xca5a_8263_9512_1157));
    mix(h)
}

/// Hash a lattice coordinate to a uniform `f64` in [0, 1).
///
/// Upper 53 bits fill the f64 mantissa — the same technique the project's
/// PRNG uses for unit floats.
pub fn hash_unit(seed: u64, salt: u64, x: i32, y: i32) -> f64 {
    (hash_coords(seed, salt, x, y) >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_inputs_same_output() {
        for i in 0..100 {
            assert_eq!(
                hash_coords(12345, 7, i, -i),
                hash_coords(12345, 7, i, -i)
            );
        }
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(hash_coords(1, 0, 5, 5), hash_coords(2, 0, 5, 5));
    }

    #[test]
    fn different_salts_differ() {
        assert_ne!(hash_coords(42, 1, 5, 5), hash_coords(42, 2, 5, 5));
    }

    #[test]
    fn coordinates_are_not_symmetric() {
        assert_ne!(hash_coords(42, 0, 3, 9), hash_coords(42, 0, 9, 3));
    }

    #[test]
    fn negative_coordinates_are_distinct() {
        assert_ne!(hash_coords(42, 0, -1, 0), hash_coords(42, 0, 1, 0));
        assert_ne!(hash_coords(42, 0, 0, -1), hash_coords(42, 0, 0, 1));
    }

    #[test]
    fn unit_hash_in_range() {
        for x in -50..50 {
            for y in -50..50 {
                let v = hash_unit(999, 3, x, y);
                assert!((0.0..1.0).contains(&v), "out of range: {v}");
            }
        }
    }

    #[test]
    fn unit_hash_is_roughly_uniform() {
        let mut below_half = 0;
        let n = 10_000;
        for i in 0..n {
            if hash_unit(7, 0, i, i * 31) < 0.5 {
                below_half += 1;
            }
        }
        let pct = f64::from(below_half) / f64::from(n);
        assert!((0.45..0.55).contains(&pct), "not uniform: {pct}");
    }
}
