//! Scalar interpolation helpers used by the track smoother

/// Evaluate a uniform Catmull-Rom spline through `values` at `k` in `[0, 1]`.
///
/// A `cyclic` sequence repeats its first value at the end and the neighbours wrap
/// around. Otherwise the ends are clamped and `k` outside `[0, 1]` extrapolates
/// along the end tangents.
pub fn catmull_rom(values: &[f64], k: f64, cyclic: bool) -> f64 {
    match values.len() {
        0 => return 0.0,
        1 => return values[0],
        _ => {}
    }

    let m = values.len() - 1;
    let mut f = m as f64 * k;
    let mut i = f.floor() as isize;

    if cyclic {
        if k < 0.0 {
            f = m as f64 * (1.0 + k);
            i = f.floor() as isize;
        }

        let m = m as isize;
        let at = |j: isize| values[j.rem_euclid(m) as usize];
        return segment(f - i as f64, at(i - 1), at(i), at(i + 1), at(i + 2));
    }

    if k < 0.0 {
        return values[0] - (segment(-f, values[0], values[0], values[1], values[1]) - values[0]);
    }

    if k > 1.0 {
        return values[m]
            - (segment(f - m as f64, values[m], values[m], values[m - 1], values[m - 1]) - values[m]);
    }

    let i = i as usize;
    let x1 = i.saturating_sub(1);
    let x2 = (i + 1).min(m);
    let x3 = (i + 2).min(m);

    segment(f - i as f64, values[x1], values[i], values[x2], values[x3])
}

/// One Catmull-Rom segment between `p1` and `p2` with tension 0.5
fn segment(t: f64, p0: f64, p1: f64, p2: f64, p3: f64) -> f64 {
    let v0 = (p2 - p0) * 0.5;
    let v1 = (p3 - p1) * 0.5;
    let t2 = t * t;
    let t3 = t * t2;

    (2.0 * p1 - 2.0 * p2 + v0 + v1) * t3 + (-3.0 * p1 + 3.0 * p2 - 2.0 * v0 - v1) * t2 + v0 * t + p1
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_passes_through_control_points_open() {
        let values = [0.0, 3.0, 1.0, 7.0, 2.0];
        let m = (values.len() - 1) as f64;
        for (i, v) in values.iter().enumerate() {
            let got = catmull_rom(&values, i as f64 / m, false);
            assert!((got - v).abs() < EPSILON, "index {} got {} want {}", i, got, v);
        }
    }

    #[test]
    fn test_passes_through_control_points_closed() {
        let values = [5.0, 1.0, 8.0, 3.0, 5.0];
        let m = (values.len() - 1) as f64;
        for (i, v) in values.iter().enumerate() {
            let got = catmull_rom(&values, i as f64 / m, true);
            assert!((got - v).abs() < EPSILON, "index {} got {} want {}", i, got, v);
        }
    }

    #[test]
    fn test_closed_curve_ends_meet() {
        let values = [5.0, 1.0, 8.0, 3.0, 5.0];
        assert!((catmull_rom(&values, 0.0, true) - catmull_rom(&values, 1.0, true)).abs() < EPSILON);
    }

    #[test]
    fn test_constant_sequence_is_flat() {
        let values = [2.0; 6];
        for step in 0..=20 {
            let k = step as f64 / 20.0;
            assert!((catmull_rom(&values, k, false) - 2.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(catmull_rom(&[], 0.5, false), 0.0);
        assert_eq!(catmull_rom(&[4.0], 0.5, true), 4.0);
    }

    #[test]
    fn test_matching_ends_do_not_imply_wrap() {
        // Open sequence whose ends happen to agree
        let values = [1.0, 4.0, 9.0, 1.0];
        let open = catmull_rom(&values, 0.1, false);
        let wrapped = catmull_rom(&values, 0.1, true);
        assert!((open - wrapped).abs() > EPSILON);
    }
}
