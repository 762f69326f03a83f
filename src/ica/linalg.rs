//! Dense symmetric linear algebra for the decomposition.
//!
//! Channel counts are small (tens), so a cyclic Jacobi sweep is accurate and
//! fast enough and keeps the crate free of BLAS/LAPACK.
use ndarray::{Array1, Array2, Axis};

const MAX_SWEEPS: usize = 100;

/// Eigen-decomposition of a symmetric matrix.
///
/// Returns `(values, vectors)` sorted by descending eigenvalue; column `i` of
/// `vectors` belongs to `values[i]`.
pub fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut m = a.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale: f64 = m.iter().map(|x| x * x).sum::<f64>().sqrt();
    let threshold = f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| m[[p, q]] * m[[p, q]])
            .sum::<f64>()
            .sqrt();
        if off <= threshold {
            break;
        }
        for p in 0..n {
            for q in p + 1..n {
                let apq = m[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate(&mut m, &mut v, p, q, c, s);
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].total_cmp(&m[[i, i]]));
    let values = Array1::from_iter(order.iter().map(|&i| m[[i, i]]));
    let vectors = v.select(Axis(1), &order);
    (values, vectors)
}

/// Apply the Jacobi rotation `(p, q, c, s)` to `m` (both sides) and `v` (right).
fn rotate(m: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = m.nrows();
    for k in 0..n {
        let mkp = m[[k, p]];
        let mkq = m[[k, q]];
        m[[k, p]] = c * mkp - s * mkq;
        m[[k, q]] = s * mkp + c * mkq;
    }
    for k in 0..n {
        let mpk = m[[p, k]];
        let mqk = m[[q, k]];
        m[[p, k]] = c * mpk - s * mqk;
        m[[q, k]] = s * mpk + c * mqk;
    }
    for k in 0..n {
        let vkp = v[[k, p]];
        let vkq = v[[k, q]];
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

/// Symmetric decorrelation `W ← (W Wᵀ)^(-1/2) W`.
pub fn symmetric_decorrelation(w: &Array2<f64>) -> Array2<f64> {
    let (s, u) = symmetric_eigen(&w.dot(&w.t()));
    let inv_sqrt = s.mapv(|v| 1.0 / v.max(f64::MIN_POSITIVE).sqrt());
    let scaled = &u * &inv_sqrt.insert_axis(Axis(0));
    scaled.dot(&u.t()).dot(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn eigen_reconstructs_matrix() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]];
        let (vals, vecs) = symmetric_eigen(&a);
        assert!(vals[0] >= vals[1] && vals[1] >= vals[2]);
        let diag = Array2::from_diag(&vals);
        let back = vecs.dot(&diag).dot(&vecs.t());
        for (x, y) in a.iter().zip(back.iter()) {
            approx::assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
        let ortho = vecs.t().dot(&vecs);
        for ((i, j), &x) in ortho.indexed_iter() {
            approx::assert_abs_diff_eq!(x, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-10);
        }
    }

    #[test]
    fn eigen_of_diagonal_is_sorted_diagonal() {
        let a = Array2::from_diag(&array![1.0, 5.0, 3.0]);
        let (vals, _) = symmetric_eigen(&a);
        assert_eq!(vals.to_vec(), vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn decorrelated_rows_are_orthonormal() {
        let w = array![[1.0, 0.3, -0.2], [0.1, 2.0, 0.4], [-0.5, 0.2, 0.7]];
        let d = symmetric_decorrelation(&w);
        let g = d.dot(&d.t());
        for ((i, j), &x) in g.indexed_iter() {
            approx::assert_abs_diff_eq!(x, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-9);
        }
    }
}
