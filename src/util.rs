use eyre::eyre;
use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Dim, Matrix};

/// Fits a polynomial of the given degree to the data in the least-squares sense.
///
/// Returns the coefficients in order of increasing degree, i.e. `c[0] + c[1] x + c[2] x^2 + ...`.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> eyre::Result<DVector<f64>> {
    if x.len() != y.len() {
        return Err(eyre!(
            "abscissae and ordinates have different lengths ({} and {})",
            x.len(),
            y.len()
        ));
    }
    if x.len() <= degree {
        return Err(eyre!(
            "fitting a polynomial of degree {} requires more than {} data points",
            degree,
            x.len()
        ));
    }

    let vandermonde = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    let rhs = DVector::from_column_slice(y);
    vandermonde
        .svd(true, true)
        .solve(&rhs, 1e-14)
        .map_err(|err| eyre!("least-squares polynomial fit failed: {}", err))
}

/// Evaluates a polynomial with coefficients in order of increasing degree (Horner's scheme).
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Copies the entries of the global vector at the given indices into the local vector.
pub fn gather_global_to_local<'a>(
    global: impl Into<DVectorView<'a, f64>>,
    local: impl Into<DVectorViewMut<'a, f64>>,
    indices: &[usize],
) {
    let global = global.into();
    let mut local = local.into();
    assert_eq!(local.len(), indices.len(), "Local vector dimension mismatch");
    for (i_local, &i_global) in indices.iter().enumerate() {
        local[i_local] = global[i_global];
    }
}

/// Adds the entries of the local vector into the global vector at the given indices.
pub fn scatter_local_to_global_add<'a>(
    local: impl Into<DVectorView<'a, f64>>,
    global: impl Into<DVectorViewMut<'a, f64>>,
    indices: &[usize],
) {
    let local = local.into();
    let mut global = global.into();
    assert_eq!(local.len(), indices.len(), "Local vector dimension mismatch");
    for (i_local, &i_global) in indices.iter().enumerate() {
        global[i_global] += local[i_local];
    }
}

/// Copies the upper triangle of a square matrix into the lower triangle.
pub(crate) fn clone_upper_to_lower<R, C, S>(matrix: &mut Matrix<f64, R, C, S>)
where
    R: Dim,
    C: Dim,
    S: StorageMut<f64, R, C>,
{
    assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square");
    let n = matrix.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            matrix[(i, j)] = matrix[(j, i)];
        }
    }
}
