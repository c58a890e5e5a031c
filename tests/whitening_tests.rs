use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use randompca::random::make_gaussian_seeded;
use randompca::{zca_whiten, RandomPcaConfig, RandomizedPca, StandardizationMethod};

/// Samples with covariance `Lᵗ L` for a fixed mixing matrix `L`.
fn correlated_samples(n: usize, seed: u64) -> Array2<f64> {
    let mixing = array![
        [3.0, 0.0, 0.0, 0.0],
        [1.0, 2.0, 0.0, 0.0],
        [0.5, -0.5, 1.0, 0.0],
        [0.0, 0.3, 0.2, 0.5],
    ];
    make_gaussian_seeded(n, 4, seed).dot(&mixing) + 10.0
}

#[test]
fn full_rank_whitening_inverts_feature_covariance() {
    let n = 200;
    let x = correlated_samples(n, 11);
    let cfg = RandomPcaConfig {
        standardization: StandardizationMethod::Center,
        ndim: 4,
        nextra: 0,
        maxiter: 10,
        ..Default::default()
    };
    let out = RandomizedPca::new(cfg).compute(x.clone()).unwrap();
    let whitened = zca_whiten(&out, x.clone()).unwrap();
    assert_eq!(whitened.dim(), (n, 4));

    let mut centered = x;
    out.mean_sd.apply(&mut centered, out.orientation).unwrap();
    let dof = (n - 1) as f64;
    let covariance = centered.t().dot(&centered) / dof;
    let whitened_gram = whitened.t().dot(&whitened) / dof;
    // Wᵗ W / (N-1) = V D⁻¹ Vᵗ, the inverse of the feature covariance V D Vᵗ
    assert_abs_diff_eq!(whitened_gram.dot(&covariance), Array2::<f64>::eye(4), epsilon = 1e-6);
}

#[test]
fn transposed_whitening_matches_samples_in_rows() {
    let n = 80;
    let x = correlated_samples(n, 12);
    let cfg = RandomPcaConfig {
        standardization: StandardizationMethod::Scale,
        ndim: 3,
        nextra: 1,
        maxiter: 10,
        ..Default::default()
    };
    let rows = RandomizedPca::new(cfg.clone()).compute(x.clone()).unwrap();
    let cols = RandomizedPca::new(RandomPcaConfig { transpose: true, ..cfg })
        .compute(x.t().to_owned())
        .unwrap();

    let from_rows = zca_whiten(&rows, x.clone()).unwrap();
    let from_cols = zca_whiten(&cols, x.t().to_owned()).unwrap();
    // component signs cancel in U diag(1/d) Uᵗ
    assert_abs_diff_eq!(from_rows, from_cols, epsilon = 1e-6);
}
