use crate::types::{ExtractError, ExtractResult, GeoPoint, GridPoint, SurveyKind};

/// Default ridge strengths tried by cross-validation
pub const DEFAULT_RIDGE_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

/// Relative determinant below which the normal matrix is treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// How the geographic-to-grid map is fitted
#[derive(Debug, Clone, PartialEq)]
pub enum RegressionStrategy {
    /// Ordinary least squares affine fit
    LeastSquares,
    /// Ridge-regularised affine fit, strength chosen by leave-one-out CV
    RidgeCv { alphas: Vec<f64> },
}

impl RegressionStrategy {
    /// Strategy used for a survey geometry
    ///
    /// A 2D line is often curved and nearly collinear, so the affine fit is
    /// regularised there.
    pub fn for_survey(kind: SurveyKind) -> Self {
        match kind {
            SurveyKind::Survey3D => RegressionStrategy::LeastSquares,
            SurveyKind::Line2D => RegressionStrategy::RidgeCv { alphas: DEFAULT_RIDGE_ALPHAS.to_vec() },
        }
    }
}

/// Fitted affine map `(x, y) -> (inline, crossline)`
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateTransform {
    /// Row k maps (x, y) to output k
    pub coefficients: [[f64; 2]; 2],
    pub intercept: [f64; 2],
    pub strategy: RegressionStrategy,
    /// Ridge strength selected by CV
    pub alpha: Option<f64>,
}

impl CoordinateTransform {
    pub fn apply_point(&self, point: GeoPoint) -> GridPoint {
        let [x, y] = point;
        [
            self.intercept[0] + self.coefficients[0][0] * x + self.coefficients[0][1] * y,
            self.intercept[1] + self.coefficients[1][0] * x + self.coefficients[1][1] * y,
        ]
    }

    /// Map geographic points to grid coordinates, preserving order
    pub fn apply(&self, points: &[GeoPoint]) -> ExtractResult<Vec<GridPoint>> {
        points
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                if !(p[0].is_finite() && p[1].is_finite()) {
                    return Err(ExtractError::Regression(format!(
                        "cannot predict grid coordinates for point {} ({}, {})",
                        i, p[0], p[1]
                    )));
                }
                Ok(self.apply_point(p))
            })
            .collect()
    }
}

/// Centred sums used by both fits
struct CentredMoments {
    n: usize,
    mean_x: [f64; 2],
    mean_y: [f64; 2],
    /// Xc^T Xc
    sxx: [[f64; 2]; 2],
    /// Xc^T Yc, indexed [feature][output]
    sxy: [[f64; 2]; 2],
}

impl CentredMoments {
    fn new(x: &[GeoPoint], y: &[GridPoint]) -> Self {
        let n = x.len();
        let nf = n as f64;
        let mut mean_x = [0.0; 2];
        let mut mean_y = [0.0; 2];
        for (p, g) in x.iter().zip(y) {
            for k in 0..2 {
                mean_x[k] += p[k];
                mean_y[k] += g[k];
            }
        }
        for k in 0..2 {
            mean_x[k] /= nf;
            mean_y[k] /= nf;
        }

        let mut sxx = [[0.0; 2]; 2];
        let mut sxy = [[0.0; 2]; 2];
        for (p, g) in x.iter().zip(y) {
            let xc = [p[0] - mean_x[0], p[1] - mean_x[1]];
            let yc = [g[0] - mean_y[0], g[1] - mean_y[1]];
            for a in 0..2 {
                for b in 0..2 {
                    sxx[a][b] += xc[a] * xc[b];
                    sxy[a][b] += xc[a] * yc[b];
                }
            }
        }

        Self { n, mean_x, mean_y, sxx, sxy }
    }

    /// Inverse of `sxx + alpha*I`, or None when singular
    fn regularised_inverse(&self, alpha: f64) -> Option<[[f64; 2]; 2]> {
        let a = self.sxx[0][0] + alpha;
        let d = self.sxx[1][1] + alpha;
        let b = self.sxx[0][1];
        let det = a * d - b * b;
        let scale = a.abs() * d.abs();
        if !det.is_finite() || scale == 0.0 || det.abs() <= SINGULAR_TOLERANCE * scale {
            return None;
        }
        Some([[d / det, -b / det], [-b / det, a / det]])
    }

    /// Coefficients `W` (indexed [output][feature]) and intercept for a given inverse
    fn solve(&self, inverse: &[[f64; 2]; 2]) -> ([[f64; 2]; 2], [f64; 2]) {
        let mut coefficients = [[0.0; 2]; 2];
        for out in 0..2 {
            for feat in 0..2 {
                coefficients[out][feat] =
                    inverse[feat][0] * self.sxy[0][out] + inverse[feat][1] * self.sxy[1][out];
            }
        }
        let mut intercept = [0.0; 2];
        for out in 0..2 {
            intercept[out] = self.mean_y[out]
                - coefficients[out][0] * self.mean_x[0]
                - coefficients[out][1] * self.mean_x[1];
        }
        (coefficients, intercept)
    }
}

/// Fits the geographic-to-grid transform from trace header samples
pub struct CoordinateMapper;

impl CoordinateMapper {
    pub fn fit(
        strategy: &RegressionStrategy,
        geo_coords: &[GeoPoint],
        grid_coords: &[GridPoint],
    ) -> ExtractResult<CoordinateTransform> {
        if geo_coords.is_empty() {
            return Err(ExtractError::Regression("no coordinates to fit".to_string()));
        }
        if geo_coords.len() != grid_coords.len() {
            return Err(ExtractError::Regression(format!(
                "{} geographic coordinates but {} grid coordinates",
                geo_coords.len(),
                grid_coords.len()
            )));
        }
        let all_finite = geo_coords
            .iter()
            .chain(grid_coords.iter())
            .all(|p| p[0].is_finite() && p[1].is_finite());
        if !all_finite {
            return Err(ExtractError::Regression("non-finite coordinate in training data".to_string()));
        }

        let moments = CentredMoments::new(geo_coords, grid_coords);
        match strategy {
            RegressionStrategy::LeastSquares => Self::fit_least_squares(&moments),
            RegressionStrategy::RidgeCv { alphas } => {
                Self::fit_ridge_cv(&moments, alphas, geo_coords, grid_coords)
            }
        }
    }

    fn fit_least_squares(moments: &CentredMoments) -> ExtractResult<CoordinateTransform> {
        if moments.n < 3 {
            return Err(ExtractError::Regression(format!(
                "least squares needs at least 3 traces, got {}",
                moments.n
            )));
        }
        let inverse = moments.regularised_inverse(0.0).ok_or_else(|| {
            ExtractError::Regression(
                "trace coordinates are collinear or degenerate; cannot fit an affine map".to_string(),
            )
        })?;
        let (coefficients, intercept) = moments.solve(&inverse);
        log::debug!("Least squares transform: coef={:?} intercept={:?}", coefficients, intercept);
        Ok(CoordinateTransform {
            coefficients,
            intercept,
            strategy: RegressionStrategy::LeastSquares,
            alpha: None,
        })
    }

    fn fit_ridge_cv(
        moments: &CentredMoments,
        alphas: &[f64],
        geo_coords: &[GeoPoint],
        grid_coords: &[GridPoint],
    ) -> ExtractResult<CoordinateTransform> {
        if moments.n < 2 {
            return Err(ExtractError::Regression(format!(
                "ridge regression needs at least 2 traces, got {}",
                moments.n
            )));
        }
        if alphas.is_empty() || alphas.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(ExtractError::Regression(format!("invalid ridge strengths {:?}", alphas)));
        }

        let nf = moments.n as f64;
        let mut best: Option<(f64, f64, [[f64; 2]; 2], [f64; 2])> = None;

        for &alpha in alphas {
            let Some(inverse) = moments.regularised_inverse(alpha) else {
                continue;
            };
            let (coefficients, intercept) = moments.solve(&inverse);

            // Leave-one-out residuals from the hat matrix diagonal
            let mut score = 0.0;
            for (p, g) in geo_coords.iter().zip(grid_coords) {
                let xc = [p[0] - moments.mean_x[0], p[1] - moments.mean_x[1]];
                let leverage = 1.0 / nf
                    + xc[0] * (inverse[0][0] * xc[0] + inverse[0][1] * xc[1])
                    + xc[1] * (inverse[1][0] * xc[0] + inverse[1][1] * xc[1]);
                let denom = (1.0 - leverage).max(f64::EPSILON);
                for out in 0..2 {
                    let fitted =
                        intercept[out] + coefficients[out][0] * p[0] + coefficients[out][1] * p[1];
                    let loo = (g[out] - fitted) / denom;
                    score += loo * loo;
                }
            }
            score /= 2.0 * nf;
            log::debug!("Ridge alpha={} LOO mse={:.6}", alpha, score);

            if best.as_ref().map_or(true, |(s, ..)| score < *s) {
                best = Some((score, alpha, coefficients, intercept));
            }
        }

        let (_, alpha, coefficients, intercept) = best.ok_or_else(|| {
            ExtractError::Regression("ridge regression failed for every strength".to_string())
        })?;
        log::debug!("Ridge transform: alpha={} coef={:?} intercept={:?}", alpha, coefficients, intercept);
        Ok(CoordinateTransform {
            coefficients,
            intercept,
            strategy: RegressionStrategy::RidgeCv { alphas: alphas.to_vec() },
            alpha: Some(alpha),
        })
    }
}
