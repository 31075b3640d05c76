use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Squared Euclidean distance between two vectors of equal length
#[inline]
pub fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Index of the nearest centroid and its squared distance.
///
/// Ties go to the lowest centroid index.
#[inline]
pub fn nearest_centroid(point: &ArrayView1<f64>, centroids: &ArrayView2<f64>) -> (usize, f64) {
    let mut best_label = 0;
    let mut best_dist = f64::INFINITY;

    for (j, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best_dist {
            best_dist = dist;
            best_label = j;
        }
    }

    (best_label, best_dist)
}

/// Assign every row of `data` to its nearest centroid.
///
/// Returns the labels and the squared distance of each row to its centroid.
/// Rows are independent so the work is split across the rayon pool; the
/// result does not depend on the number of threads.
pub fn assign_labels(
    data: &ArrayView2<f64>,
    centroids: &ArrayView2<f64>,
) -> (Array1<usize>, Array1<f64>) {
    let n_samples = data.nrows();

    let pairs: Vec<(usize, f64)> = (0..n_samples)
        .into_par_iter()
        .map(|i| nearest_centroid(&data.row(i), centroids))
        .collect();

    let (labels, dists): (Vec<usize>, Vec<f64>) = pairs.into_iter().unzip();
    (Array1::from(labels), Array1::from(dists))
}

/// Squared distance of every row to its nearest centroid (k-means++ weights)
pub fn min_squared_distances(data: &ArrayView2<f64>, centroids: &ArrayView2<f64>) -> Vec<f64> {
    (0..data.nrows())
        .into_par_iter()
        .map(|i| nearest_centroid(&data.row(i), centroids).1)
        .collect()
}

/// Compute centroid shift (sum of L2 norms of centroid movements)
pub fn compute_centroid_shift(
    old_centroids: &ArrayView2<f64>,
    new_centroids: &ArrayView2<f64>,
) -> f64 {
    old_centroids
        .outer_iter()
        .zip(new_centroids.outer_iter())
        .map(|(old_c, new_c)| squared_distance(&old_c, &new_c).sqrt())
        .sum()
}
