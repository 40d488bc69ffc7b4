use ndarray::Array2;

/// Blur proxy: population variance of the 4-neighbour Laplacian over the
/// interior pixels of a grayscale image. Higher is sharper.
///
/// Images smaller than 3×3 have no interior and score 0.
pub fn laplacian_variance(gray: &Array2<f64>) -> f64 {
    let (h, w) = gray.dim();
    if h < 3 || w < 3 {
        return 0.0;
    }

    let n = ((h - 2) * (w - 2)) as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = gray[[y - 1, x]] + gray[[y + 1, x]] + gray[[y, x - 1]] + gray[[y, x + 1]]
                - 4.0 * gray[[y, x]];
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
