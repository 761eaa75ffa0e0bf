/// Just some arbitrary small number
pub const EPS: f64 = 8e-7;

/// Index and value of the largest element. `None` on empty input.
pub fn max(data: &[f64]) -> Option<(usize, f64)> {
    data.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, x)| (i, *x))
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (n - 1 in the denominator).
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

/// Median of the values, reordering `data` in the process.
pub fn median_in_place(data: &mut [f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let len = data.len();
    let (low, upper, _) = data.select_nth_unstable_by(len / 2, |a, b| a.total_cmp(b));
    let upper = *upper;
    if len % 2 == 1 {
        return Some(upper);
    }
    let lower = low
        .iter()
        .copied()
        .max_by(|a, b| a.total_cmp(b))
        .unwrap_or(upper);
    Some((lower + upper) * 0.5)
}

pub fn median(data: &[f64]) -> Option<f64> {
    median_in_place(&mut data.to_vec())
}

/// Maps an out-of-range index back into `0..len` by mirroring about the edges,
/// repeating the edge sample (`d c b a | a b c d | d c b a`).
fn reflect(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}

/// Sliding median of odd length `kernel`, with reflected edges.
pub fn median_filter(signal: &[f64], kernel: usize) -> Vec<f64> {
    assert!(kernel % 2 == 1, "median kernel must be odd");
    if signal.is_empty() {
        return Vec::new();
    }

    let half = (kernel / 2) as isize;
    let mut window = vec![0.0; kernel];
    (0..signal.len())
        .map(|i| {
            window.iter_mut().enumerate().for_each(|(k, w)| {
                *w = signal[reflect(i as isize + k as isize - half, signal.len())];
            });
            median_in_place(&mut window).unwrap_or(0.0)
        })
        .collect()
}

/// `x[i] > x[i-1] && x[i] >= x[i+1]`. The first sample is never a maximum, the
/// last one is compared with its left neighbour only.
pub fn local_maxima(data: &[f64]) -> Vec<usize> {
    (1..data.len())
        .filter(|&i| data[i] > data[i - 1] && (i + 1 == data.len() || data[i] >= data[i + 1]))
        .collect()
}

/// 'Same'-size convolution with an odd-length symmetric kernel, zero outside
/// the signal.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let half = (kernel.len() / 2) as isize;
    let n = signal.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let j = i + k as isize - half;
                    if (0..n).contains(&j) {
                        signal[j as usize] * w
                    } else {
                        0.0
                    }
                })
                .sum()
        })
        .collect()
}

/// Vertex offset, in `(-0.5, 0.5)`, of the parabola through three equally
/// spaced points centred on `b`.
pub fn parabolic_offset(a: f64, b: f64, c: f64) -> f64 {
    let denom = a - 2.0 * b + c;
    if denom.abs() < EPS {
        return 0.0;
    }
    (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
}

#[derive(Clone, Copy, Debug)]
pub enum NormalizeType {
    UnitSum,
    UnitMax,
}

pub fn normalize(data: &mut [f64], normalize_type: NormalizeType) {
    match normalize_type {
        NormalizeType::UnitSum => {
            let sum = data.iter().sum::<f64>();
            if sum != 0.0 {
                data.iter_mut().for_each(|x| *x /= sum);
            }
        }

        NormalizeType::UnitMax => {
            let max = data
                .iter()
                .map(|x| x.abs())
                .max_by(|a, b| a.total_cmp(b))
                .unwrap_or(0.0);
            if max != 0.0 {
                data.iter_mut().for_each(|x| *x /= max);
            }
        }
    };
}
