//! Iterative centroid refinement (Lloyd's K-means).
//!
//! The refinement loop is modelled as a small state machine: [`KMeansState::step`]
//! advances one phase at a time and [`fit`] applies it until the state halts.
//! Every run is fully determined by the feature matrix and the configuration.

use crate::config::{ClusterConfig, InitMethod};
use crate::distance::{assign_labels, compute_centroid_shift, min_squared_distances};
use crate::error::{KMeansError, Result};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Why the refinement loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// An assignment step changed no label
    LabelsStable,
    /// Summed centroid movement fell below the tolerance
    ToleranceReached,
    /// The iteration cap was hit first
    IterationsExhausted,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        !matches!(self, Termination::IterationsExhausted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Assigning,
    Updating,
    Converged(Termination),
    Exhausted,
}

/// Result of a clustering run
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// One label in `[0, k)` per feature vector
    pub labels: Array1<usize>,
    /// Final centroids, shape (k, n_features)
    pub centroids: Array2<f64>,
    /// Number of update steps performed
    pub iterations: usize,
    /// Sum of squared distances of every vector to its centroid
    pub inertia: f64,
    pub termination: Termination,
}

impl ClusterResult {
    /// Number of vectors assigned to each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.centroids.nrows()];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }
}

/// In-flight state of one K-means run over a borrowed feature matrix
pub struct KMeansState<'a> {
    data: ArrayView2<'a, f64>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    init: InitMethod,
    rng: ChaCha8Rng,
    phase: Phase,
    centroids: Array2<f64>,
    labels: Option<Array1<usize>>,
    distances: Array1<f64>,
    iteration: usize,
}

impl<'a> KMeansState<'a> {
    /// Start a run whose centroids are seeded from `seed`
    pub fn new(data: ArrayView2<'a, f64>, config: &ClusterConfig, seed: u64) -> Self {
        let n_features = data.ncols();
        let n_samples = data.nrows();

        Self {
            data,
            k: config.k,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            init: config.init,
            rng: ChaCha8Rng::seed_from_u64(seed),
            phase: Phase::Initializing,
            centroids: Array2::zeros((config.k, n_features)),
            labels: None,
            distances: Array1::zeros(n_samples),
            iteration: 0,
        }
    }

    /// Start a run from explicit initial centroids, skipping initialization
    pub fn with_centroids(
        data: ArrayView2<'a, f64>,
        centroids: Array2<f64>,
        config: &ClusterConfig,
    ) -> Self {
        let mut state = Self::new(data, config, config.seed);
        state.k = centroids.nrows();
        state.centroids = centroids;
        state.phase = Phase::Assigning;
        state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.phase, Phase::Converged(_) | Phase::Exhausted)
    }

    /// Advance the state machine by one phase
    pub fn step(&mut self) {
        let phase = self.phase;
        self.phase = match phase {
            Phase::Initializing => {
                self.centroids = match self.init {
                    InitMethod::Random => init_random(&self.data, self.k, &mut self.rng),
                    InitMethod::KMeansPlusPlus => {
                        init_plus_plus(&self.data, self.k, &mut self.rng)
                    }
                };
                Phase::Assigning
            }
            Phase::Assigning => self.assign(),
            Phase::Updating => self.update(),
            halted => halted,
        };
    }

    fn assign(&mut self) -> Phase {
        let (labels, distances) = assign_labels(&self.data, &self.centroids.view());
        self.distances = distances;

        let changed = match &self.labels {
            Some(previous) => previous
                .iter()
                .zip(labels.iter())
                .filter(|(a, b)| a != b)
                .count(),
            None => labels.len(),
        };
        self.labels = Some(labels);

        if changed == 0 {
            debug!("Iteration {}: no label changed", self.iteration);
            return Phase::Converged(Termination::LabelsStable);
        }

        debug!("Iteration {}: {} labels changed", self.iteration, changed);
        Phase::Updating
    }

    fn update(&mut self) -> Phase {
        let k = self.k;
        let n_features = self.data.ncols();
        let labels = match &self.labels {
            Some(labels) => labels,
            None => return Phase::Assigning,
        };

        // Sequential accumulation keeps the means independent of thread count
        let mut sums: Array2<f64> = Array2::zeros((k, n_features));
        let mut counts = vec![0usize; k];
        for (row, &label) in self.data.outer_iter().zip(labels.iter()) {
            counts[label] += 1;
            let mut sum = sums.row_mut(label);
            sum += &row;
        }

        let mut new_centroids = self.centroids.clone();
        let mut empty_clusters = Vec::new();
        for cluster_idx in 0..k {
            let count = counts[cluster_idx];
            if count > 0 {
                let mean = &sums.row(cluster_idx) / count as f64;
                new_centroids.row_mut(cluster_idx).assign(&mean);
            } else {
                empty_clusters.push(cluster_idx);
            }
        }

        if !empty_clusters.is_empty() {
            let mut surviving: Vec<usize> =
                (0..k).filter(|c| !empty_clusters.contains(c)).collect();
            for &cluster_idx in &empty_clusters {
                let survivors = gather_rows(&new_centroids.view(), &surviving);
                let distances = min_squared_distances(&self.data, &survivors.view());
                let data_idx = farthest_sample(&distances);
                new_centroids
                    .row_mut(cluster_idx)
                    .assign(&self.data.row(data_idx));
                surviving.push(cluster_idx);
            }
            debug!(
                "Iteration {}: reinitialized {} empty clusters",
                self.iteration,
                empty_clusters.len()
            );
        }

        let shift = compute_centroid_shift(&self.centroids.view(), &new_centroids.view());
        self.centroids = new_centroids;
        self.iteration += 1;

        debug!(
            "Iteration {}/{}: shift = {:.6}",
            self.iteration, self.max_iterations, shift
        );

        if shift < self.tolerance {
            self.relabel();
            return Phase::Converged(Termination::ToleranceReached);
        }
        if self.iteration >= self.max_iterations {
            self.relabel();
            return Phase::Exhausted;
        }
        Phase::Assigning
    }

    /// Make labels consistent with the centroids that will be returned
    fn relabel(&mut self) {
        let (labels, distances) = assign_labels(&self.data, &self.centroids.view());
        self.labels = Some(labels);
        self.distances = distances;
    }

    /// Consume a halted state into its result
    pub fn into_result(self) -> ClusterResult {
        let termination = match self.phase {
            Phase::Converged(reason) => reason,
            _ => Termination::IterationsExhausted,
        };
        let labels = self
            .labels
            .unwrap_or_else(|| Array1::zeros(self.data.nrows()));

        ClusterResult {
            inertia: self.distances.sum(),
            labels,
            centroids: self.centroids,
            iterations: self.iteration,
            termination,
        }
    }
}

/// Index of the sample farthest from every surviving centroid.
/// Ties go to the lowest index.
fn farthest_sample(distances: &[f64]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::NEG_INFINITY;

    for (i, &dist) in distances.iter().enumerate() {
        if dist > best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }

    best_idx
}

/// Pick k pairwise-distinct vectors from a seeded permutation of the data.
///
/// Falls back to repeated vectors only when fewer than k distinct ones exist.
fn init_random(data: &ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = data.nrows();

    let mut order: Vec<usize> = (0..n_samples).collect();
    order.shuffle(rng);

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    for &idx in &order {
        if selected.len() == k {
            break;
        }
        if selected.iter().all(|&s| data.row(s) != data.row(idx)) {
            selected.push(idx);
        }
    }

    if selected.len() < k {
        debug!(
            "Only {} distinct feature vectors for {} clusters",
            selected.len(),
            k
        );
        for &idx in &order {
            if selected.len() == k {
                break;
            }
            if !selected.contains(&idx) {
                selected.push(idx);
            }
        }
    }

    gather_rows(data, &selected)
}

/// D²-weighted seeding
fn init_plus_plus(data: &ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = data.nrows();

    let mut selected = Vec::with_capacity(k);
    selected.push(rng.gen_range(0..n_samples));

    while selected.len() < k {
        let centroids = gather_rows(data, &selected);
        let weights = min_squared_distances(data, &centroids.view());
        let total: f64 = weights.iter().sum();

        let next = if total <= 0.0 {
            rng.gen_range(0..n_samples)
        } else {
            let mut threshold = rng.gen::<f64>() * total;
            let mut chosen = None;
            for (i, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                chosen = Some(i);
                threshold -= w;
                if threshold <= 0.0 {
                    break;
                }
            }
            chosen.unwrap_or(0)
        };
        selected.push(next);
    }

    gather_rows(data, &selected)
}

fn gather_rows(data: &ArrayView2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut rows = Array2::zeros((indices.len(), data.ncols()));
    for (dst, &src) in indices.iter().enumerate() {
        rows.row_mut(dst).assign(&data.row(src));
    }
    rows
}

/// Partition the rows of `data` into `config.k` clusters.
///
/// Runs `config.n_init` seeded initializations and keeps the one with the
/// lowest inertia (the earliest on ties).
pub fn fit(data: &ArrayView2<f64>, config: &ClusterConfig) -> Result<ClusterResult> {
    config.validate()?;

    let n_samples = data.nrows();
    if config.k > n_samples {
        return Err(KMeansError::TooFewSamples {
            k: config.k,
            samples: n_samples,
        });
    }

    info!(
        "Clustering {} vectors of {} features into {} clusters ({} initialization(s))",
        n_samples,
        data.ncols(),
        config.k,
        config.n_init
    );

    let mut best: Option<ClusterResult> = None;
    for run in 0..config.n_init {
        let seed = config.seed.wrapping_add(run as u64);
        let mut state = KMeansState::new(data.view(), config, seed);
        while !state.is_halted() {
            state.step();
        }
        let result = state.into_result();

        debug!(
            "Run {}/{}: inertia = {:.6}, iterations = {}, termination = {:?}",
            run + 1,
            config.n_init,
            result.inertia,
            result.iterations,
            result.termination
        );

        let improves = best
            .as_ref()
            .map_or(true, |b| result.inertia < b.inertia);
        if improves {
            best = Some(result);
        }
    }

    let result = best.ok_or(KMeansError::InvalidInitCount(config.n_init))?;

    if result.termination.is_converged() {
        info!(
            "Converged after {} iterations ({:?}), inertia = {:.6}",
            result.iterations, result.termination, result.inertia
        );
    } else {
        info!(
            "Stopped at the iteration cap ({}) without converging, inertia = {:.6}",
            result.iterations, result.inertia
        );
    }

    Ok(result)
}
