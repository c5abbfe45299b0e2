use super::core::{Point3, Tolerance, Vec3};

pub trait Curve3 {
    fn point_at(&self, t: f64) -> Point3;

    #[must_use]
    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn is_closed(&self) -> bool {
        false
    }

    #[must_use]
    fn derivative_at(&self, t: f64) -> Vec3 {
        central_difference(self, t)
    }

    /// Unit tangent at `t`, or `None` where the derivative vanishes.
    #[must_use]
    fn tangent_at(&self, t: f64) -> Option<Vec3> {
        let d = self.derivative_at(t);
        if Tolerance::ZERO_LENGTH.is_zero_vec3(d) {
            return None;
        }
        d.normalized()
    }

    #[must_use]
    fn start_point(&self) -> Point3 {
        self.point_at(self.domain().0)
    }

    #[must_use]
    fn end_point(&self) -> Point3 {
        self.point_at(self.domain().1)
    }
}

/// Finite-difference first derivative, one-sided at the domain ends.
fn central_difference<C: Curve3 + ?Sized>(curve: &C, t: f64) -> Vec3 {
    let (a, b) = curve.domain();
    let span = b - a;
    if !span.is_finite() || span == 0.0 {
        return Vec3::ZERO;
    }
    let h = Tolerance::DERIVATIVE.relative_to(span);
    let t0 = (t - h).max(a);
    let t1 = (t + h).min(b);
    if t1 <= t0 {
        return Vec3::ZERO;
    }
    curve.point_at(t1).sub_point(curve.point_at(t0)).mul_scalar(1.0 / (t1 - t0))
}

// ============================================================================
// Polyline
// ============================================================================

/// Piecewise-linear curve parameterized by normalized arc length on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline3 {
    points: Vec<Point3>,
    cumulative: Vec<f64>,
    total_length: f64,
    closed: bool,
}

impl Polyline3 {
    pub fn new(mut points: Vec<Point3>, closed: bool) -> Result<Self, String> {
        if points.len() < 2 {
            return Err("polyline requires at least 2 points".to_string());
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err("polyline points must be finite".to_string());
        }
        if closed && points.len() > 2 && points.first() == points.last() {
            points.pop();
        }

        let mut cumulative = Vec::with_capacity(points.len() + 1);
        let mut total = 0.0;
        cumulative.push(total);
        for pair in points.windows(2) {
            total += pair[0].distance_to(pair[1]);
            cumulative.push(total);
        }
        if closed {
            total += points[points.len() - 1].distance_to(points[0]);
            cumulative.push(total);
        }

        Ok(Self {
            points,
            cumulative,
            total_length: total,
            closed,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    #[must_use]
    pub const fn length(&self) -> f64 {
        self.total_length
    }

    /// Same vertices in the opposite order.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        if self.closed {
            // Keep the seam vertex first so the reversed loop starts where the original ended.
            points.rotate_right(1);
        }
        Self::new(points, self.closed).unwrap_or_else(|_| self.clone())
    }

    fn segment_count(&self) -> usize {
        self.cumulative.len() - 1
    }

    fn segment(&self, index: usize) -> (Point3, Point3) {
        let a = self.points[index];
        let b = self.points[(index + 1) % self.points.len()];
        (a, b)
    }

    /// Segment index and local ratio for normalized parameter `t`.
    fn locate(&self, t: f64) -> (usize, f64) {
        let target = t.clamp(0.0, 1.0) * self.total_length;
        let last = self.segment_count() - 1;
        let idx = match self.cumulative.binary_search_by(|v| v.total_cmp(&target)) {
            Ok(i) => i.min(last),
            Err(i) => i.saturating_sub(1).min(last),
        };
        let seg_len = self.cumulative[idx + 1] - self.cumulative[idx];
        if seg_len <= 0.0 {
            return (idx, 0.0);
        }
        (idx, ((target - self.cumulative[idx]) / seg_len).clamp(0.0, 1.0))
    }
}

impl Curve3 for Polyline3 {
    fn point_at(&self, t: f64) -> Point3 {
        if self.total_length <= 0.0 || !self.total_length.is_finite() {
            return self.points[0];
        }
        let (idx, ratio) = self.locate(t);
        let (a, b) = self.segment(idx);
        a.lerp(b, ratio)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        if self.total_length <= 0.0 {
            return Vec3::ZERO;
        }
        let (idx, _) = self.locate(t);
        let (a, b) = self.segment(idx);
        b.sub_point(a)
            .normalized()
            .map_or(Vec3::ZERO, |dir| dir.mul_scalar(self.total_length))
    }
}

// ============================================================================
// NURBS curve
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NurbsCurve3 {
    pub degree: usize,
    pub control_points: Vec<Point3>,
    pub knots: Vec<f64>,
    pub weights: Option<Vec<f64>>,
}

impl NurbsCurve3 {
    pub fn new(
        degree: usize,
        control_points: Vec<Point3>,
        knots: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, String> {
        if control_points.len() < 2 {
            return Err("nurbs curve requires at least 2 control points".to_string());
        }
        if degree == 0 || degree >= control_points.len() {
            return Err(format!(
                "nurbs curve degree must be in 1..{}, got {degree}",
                control_points.len()
            ));
        }
        let expected = control_points.len() + degree + 1;
        if knots.len() != expected {
            return Err(format!("nurbs curve knot length must be {expected}, got {}", knots.len()));
        }
        if knots.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err("nurbs curve knots must be finite and non-decreasing".to_string());
        }
        if knots[degree] >= knots[control_points.len()] {
            return Err("nurbs curve has an empty parameter domain".to_string());
        }
        if let Some(w) = &weights {
            if w.len() != control_points.len() || w.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err("nurbs curve weights must be positive, one per control point".to_string());
            }
        }
        if control_points.iter().any(|p| !p.is_finite()) {
            return Err("nurbs curve control points must be finite".to_string());
        }
        Ok(Self {
            degree,
            control_points,
            knots,
            weights,
        })
    }

    /// Interpolates `points` with chord-length parameters.
    ///
    /// When `closed` is set the result is a periodic curve whose seam is
    /// smooth. Periodic fits use an odd degree (an even request is lowered by
    /// one) and need at least three distinct points; fewer fall back to an
    /// open fit.
    pub fn interpolate_through_points(points: &[Point3], degree: usize, closed: bool) -> Result<Self, String> {
        let points = distinct_points(points);
        if points.len() < 2 {
            return Err("interpolation requires at least 2 distinct points".to_string());
        }
        if closed {
            let mut ring = points.clone();
            if ring.len() > 2 && Tolerance::DEFAULT.approx_eq_point3(ring[0], ring[ring.len() - 1]) {
                ring.pop();
            }
            if ring.len() >= 3 {
                return Self::interpolate_periodic(&ring, degree);
            }
        }
        let params = chord_parameters(&points, false);
        Self::interpolate_open(&points, &params, degree)
    }

    /// Interpolates `points` at evenly spaced parameters.
    pub fn interpolate_uniform(points: &[Point3], degree: usize) -> Result<Self, String> {
        if points.len() < 2 {
            return Err("interpolation requires at least 2 points".to_string());
        }
        let last = (points.len() - 1) as f64;
        let params: Vec<f64> = (0..points.len()).map(|i| i as f64 / last).collect();
        Self::interpolate_open(points, &params, degree)
    }

    fn interpolate_open(points: &[Point3], params: &[f64], degree: usize) -> Result<Self, String> {
        let n = points.len();
        let p = degree.clamp(1, n - 1);

        let mut knots = vec![0.0; p + 1];
        for j in 1..n - p {
            knots.push(params[j..j + p].iter().sum::<f64>() / p as f64);
        }
        knots.extend(std::iter::repeat_n(1.0, p + 1));

        let mut system = BandedSystem::new(n, 0);
        for (row, &t) in params.iter().enumerate() {
            let span = find_span(n - 1, p, t, &knots);
            for (r, value) in basis_functions(span, t, p, &knots).into_iter().enumerate() {
                system.add(row, span - p + r, value);
            }
        }

        let control_points = system.solve(points)?;
        Self::new(p, control_points, knots, None)
    }

    fn interpolate_periodic(points: &[Point3], degree: usize) -> Result<Self, String> {
        let n = points.len();
        let mut p = degree.clamp(1, n - 1);
        if p % 2 == 0 {
            p -= 1;
        }
        let params = chord_parameters(points, true);
        let m = n + p;

        // Knot k maps to params[k mod n] plus the number of full wraps.
        let wrapped = |k: isize| -> f64 {
            let n = n as isize;
            let wraps = k.div_euclid(n);
            params[k.rem_euclid(n) as usize] + wraps as f64
        };
        let knots: Vec<f64> = (0..m + p + 1).map(|i| wrapped(i as isize - p as isize)).collect();

        // Unknowns are rotated by `half` so the largest basis value of each
        // row lands on the diagonal. Rows then reach `half` columns either
        // side, wrapping into the last `half` columns at the top.
        let half = (p - 1) / 2;
        let rotate = |col: usize| (col + n - half) % n;
        let mut system = BandedSystem::new(n, half);
        for (row, &t) in params.iter().enumerate() {
            let span = find_span(m - 1, p, t, &knots);
            for (r, value) in basis_functions(span, t, p, &knots).into_iter().enumerate() {
                system.add(row, rotate((span - p + r) % n), value);
            }
        }

        let rotated = system.solve(points)?;
        let control_points = (0..m).map(|j| rotated[rotate(j % n)]).collect();
        Self::new(p, control_points, knots, None)
    }

    /// Same geometry traversed in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let first = self.knots[0];
        let last = self.knots[self.knots.len() - 1];
        let knots = self.knots.iter().rev().map(|k| first + last - k).collect();
        let mut control_points = self.control_points.clone();
        control_points.reverse();
        let weights = self.weights.as_ref().map(|w| w.iter().rev().copied().collect());
        Self {
            degree: self.degree,
            control_points,
            knots,
            weights,
        }
    }

    fn clamp_param(&self, t: f64) -> f64 {
        let (a, b) = self.domain();
        if t.is_nan() { a } else { t.clamp(a, b) }
    }

    fn span_at(&self, u: f64) -> usize {
        find_span(self.control_points.len() - 1, self.degree, u, &self.knots)
    }
}

impl Curve3 for NurbsCurve3 {
    fn point_at(&self, t: f64) -> Point3 {
        let p = self.degree;
        let u = self.clamp_param(t);
        let span = self.span_at(u);
        let basis = basis_functions(span, u, p, &self.knots);

        let mut acc = Vec3::ZERO;
        let mut weight_sum = 0.0;
        for (r, n) in basis.into_iter().enumerate() {
            let i = span - p + r;
            let w = self.weights.as_ref().map_or(1.0, |w| w[i]);
            acc = acc.add(self.control_points[i].to_vec3().mul_scalar(n * w));
            weight_sum += n * w;
        }
        if weight_sum.abs() < 1e-14 {
            return self.control_points[span];
        }
        let v = acc.mul_scalar(1.0 / weight_sum);
        Point3::new(v.x, v.y, v.z)
    }

    fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.control_points.len()])
    }

    fn is_closed(&self) -> bool {
        Tolerance::DEFAULT.approx_eq_point3(self.start_point(), self.end_point())
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        if self.weights.is_some() {
            return central_difference(self, t);
        }
        // Non-rational: the hodograph is a degree p-1 spline over
        // Q_i = p (P_{i+1} - P_i) / (u_{i+p+1} - u_{i+1}).
        let p = self.degree;
        let u = self.clamp_param(t);
        let span = self.span_at(u);
        let basis = basis_functions(span, u, p - 1, &self.knots);

        basis.into_iter().enumerate().fold(Vec3::ZERO, |acc, (r, n)| {
            let i = span - p + r;
            let denom = self.knots[i + p + 1] - self.knots[i + 1];
            if denom.abs() <= 1e-14 {
                return acc;
            }
            let q = self.control_points[i + 1]
                .sub_point(self.control_points[i])
                .mul_scalar(p as f64 / denom);
            acc.add(q.mul_scalar(n))
        })
    }
}

fn distinct_points(points: &[Point3]) -> Vec<Point3> {
    let mut out: Vec<Point3> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_none_or(|last| !Tolerance::DEFAULT.approx_eq_point3(*last, p)) {
            out.push(p);
        }
    }
    out
}

/// Normalized chord-length parameters. Closed sets include the closing chord,
/// so the last point sits strictly below 1.
fn chord_parameters(points: &[Point3], closed: bool) -> Vec<f64> {
    let mut params = Vec::with_capacity(points.len());
    let mut total = 0.0;
    params.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].distance_to(pair[1]);
        params.push(total);
    }
    if closed {
        total += points[points.len() - 1].distance_to(points[0]);
    }
    if total <= 0.0 {
        let denom = if closed { points.len() } else { points.len() - 1 } as f64;
        return (0..points.len()).map(|i| i as f64 / denom).collect();
    }
    params.iter().map(|d| d / total).collect()
}

pub(crate) fn find_span(n: usize, p: usize, u: f64, knots: &[f64]) -> usize {
    if u >= knots[n + 1] {
        return n;
    }
    if u <= knots[p] {
        return p;
    }
    let (mut low, mut high) = (p, n + 1);
    let mut mid = (low + high) / 2;
    while u < knots[mid] || u >= knots[mid + 1] {
        if u < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-vanishing basis functions `N_{span-p..=span, p}(u)`.
pub(crate) fn basis_functions(span: usize, u: f64, p: usize, knots: &[f64]) -> Vec<f64> {
    let mut n = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    n[0] = 1.0;
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}

/// Pivots smaller than this make the collocation system singular.
const SINGULAR_PIVOT: f64 = 1e-12;

/// One row of a [`BandedSystem`]: a dense window over ordinary columns plus
/// a dense block for the trailing border columns.
#[derive(Debug, Clone, Default)]
struct BandRow {
    lo: usize,
    window: Vec<f64>,
    border: Vec<f64>,
}

impl BandRow {
    fn hi(&self) -> usize {
        self.lo + self.window.len()
    }
}

/// Square collocation system stored row by row.
///
/// B-spline collocation matrices are banded, and periodic ones are banded
/// apart from a few wrapped entries that live in the border columns. Memory
/// and fill stay proportional to `n * (degree + 1)` rather than `n * n`.
#[derive(Debug, Clone)]
struct BandedSystem {
    n: usize,
    /// Columns at or past this index are stored in `BandRow::border`.
    border_start: usize,
    rows: Vec<BandRow>,
}

impl BandedSystem {
    fn new(n: usize, border: usize) -> Self {
        Self {
            n,
            border_start: n - border.min(n),
            rows: vec![BandRow::default(); n],
        }
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        let r = &self.rows[row];
        if col >= self.border_start {
            return r.border.get(col - self.border_start).copied().unwrap_or(0.0);
        }
        if (r.lo..r.hi()).contains(&col) { r.window[col - r.lo] } else { 0.0 }
    }

    fn add(&mut self, row: usize, col: usize, value: f64) {
        if value == 0.0 {
            return;
        }
        let border_width = self.n - self.border_start;
        let r = &mut self.rows[row];
        if col >= self.border_start {
            if r.border.is_empty() {
                r.border = vec![0.0; border_width];
            }
            r.border[col - self.border_start] += value;
            return;
        }
        if r.window.is_empty() {
            r.lo = col;
        } else if col < r.lo {
            r.window.splice(0..0, std::iter::repeat_n(0.0, r.lo - col));
            r.lo = col;
        }
        if col >= r.hi() {
            r.window.resize(col - r.lo + 1, 0.0);
        }
        r.window[col - r.lo] += value;
    }

    /// Stored coefficients, zeros inside the windows included.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.rows.iter().map(|r| r.window.len() + r.border.len()).sum()
    }

    /// Subtracts `factor * pivot` from `row` over the columns right of `col`
    /// and clears `row` at `col`.
    fn eliminate(&mut self, row: usize, col: usize, factor: f64, pivot: &BandRow) {
        let start = pivot.lo.max(col + 1);
        for k in start..pivot.hi() {
            let value = pivot.window[k - pivot.lo];
            self.add(row, k, -factor * value);
        }
        for (j, &value) in pivot.border.iter().enumerate() {
            let k = self.border_start + j;
            if k > col {
                self.add(row, k, -factor * value);
            }
        }
        let current = self.get(row, col);
        self.add(row, col, -current);
    }

    /// Gaussian elimination without row exchanges, then back substitution.
    /// Collocation matrices of B-splines are totally positive, so the
    /// unpivoted elimination is stable and the band does not widen.
    fn solve(&mut self, rhs: &[Point3]) -> Result<Vec<Point3>, String> {
        let n = self.n;
        if rhs.len() != n {
            return Err(format!("interpolation needs {n} right-hand sides, got {}", rhs.len()));
        }
        let mut b: Vec<[f64; 3]> = rhs.iter().map(|p| p.to_array()).collect();

        let mut starting: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, row) in self.rows.iter().enumerate() {
            if !row.window.is_empty() {
                starting[row.lo].push(i);
            }
        }

        let mut active: Vec<usize> = Vec::new();
        let mut tail: Vec<usize> = Vec::new();
        for col in 0..n {
            let pivot = self.get(col, col);
            if pivot.is_nan() || pivot.abs() < SINGULAR_PIVOT {
                return Err("interpolation matrix is singular".to_string());
            }
            let pivot_row = self.rows[col].clone();
            let pivot_rhs = b[col];

            // Rows whose window covers `col`, or every later row once the
            // elimination reaches the border columns.
            let targets: &[usize] = if col < self.border_start {
                active.extend(starting[col].iter().copied());
                active.retain(|&r| r > col && self.rows[r].hi() > col);
                &active
            } else {
                tail.clear();
                tail.extend(col + 1..n);
                &tail
            };
            for &row in targets {
                let value = self.get(row, col);
                if value == 0.0 {
                    continue;
                }
                let factor = value / pivot;
                self.eliminate(row, col, factor, &pivot_row);
                for axis in 0..3 {
                    b[row][axis] -= factor * pivot_rhs[axis];
                }
            }
        }

        let mut x = vec![[0.0; 3]; n];
        for row in (0..n).rev() {
            let r = &self.rows[row];
            let mut acc = b[row];
            let later = (row + 1).max(r.lo)..r.hi();
            for k in later {
                let a = r.window[k - r.lo];
                for axis in 0..3 {
                    acc[axis] -= a * x[k][axis];
                }
            }
            for (j, &a) in r.border.iter().enumerate() {
                let k = self.border_start + j;
                if k > row {
                    for axis in 0..3 {
                        acc[axis] -= a * x[k][axis];
                    }
                }
            }
            let diagonal = self.get(row, row);
            x[row] = acc.map(|v| v / diagonal);
        }

        let points: Vec<Point3> = x.into_iter().map(Point3::from).collect();
        if points.iter().any(|p| !p.is_finite()) {
            return Err("interpolation produced non-finite control points".to_string());
        }
        Ok(points)
    }
}

// ============================================================================
// Sampling and division
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct CurveSample {
    pub point: Point3,
    /// Unit tangent, or zero where the curve has no defined direction.
    pub tangent: Vec3,
    pub parameter: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CurveDivisionResult {
    pub points: Vec<Point3>,
    pub tangents: Vec<Vec3>,
    pub parameters: Vec<f64>,
}

impl CurveDivisionResult {
    fn push(&mut self, sample: CurveSample) {
        self.points.push(sample.point);
        self.tangents.push(sample.tangent);
        self.parameters.push(sample.parameter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[must_use]
pub fn sample_curve_at<C: Curve3 + ?Sized>(curve: &C, t: f64) -> CurveSample {
    let (t0, t1) = curve.domain();
    let parameter = t.clamp(t0, t1);
    CurveSample {
        point: curve.point_at(parameter),
        tangent: curve.tangent_at(parameter).unwrap_or(Vec3::ZERO),
        parameter,
    }
}

/// Cumulative chord length sampled at evenly spaced parameters.
pub struct ArcLengthTable {
    parameters: Vec<f64>,
    lengths: Vec<f64>,
}

impl ArcLengthTable {
    #[must_use]
    pub fn build<C: Curve3 + ?Sized>(curve: &C, samples: usize) -> Self {
        let samples = samples.max(2);
        let (t0, t1) = curve.domain();
        let mut parameters = Vec::with_capacity(samples);
        let mut lengths = Vec::with_capacity(samples);
        let mut prev = curve.point_at(t0);
        let mut total = 0.0;
        for i in 0..samples {
            let t = t0 + (t1 - t0) * (i as f64 / (samples - 1) as f64);
            let p = curve.point_at(t);
            total += p.distance_to(prev);
            parameters.push(t);
            lengths.push(total);
            prev = p;
        }
        Self { parameters, lengths }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.lengths[self.lengths.len() - 1]
    }

    /// Parameter at which the accumulated length reaches `target`.
    #[must_use]
    pub fn parameter_at(&self, target: f64) -> f64 {
        let last = self.lengths.len() - 1;
        if target <= 0.0 {
            return self.parameters[0];
        }
        if target >= self.lengths[last] {
            return self.parameters[last];
        }
        let hi = self.lengths.partition_point(|l| *l < target).clamp(1, last);
        let lo = hi - 1;
        let seg = self.lengths[hi] - self.lengths[lo];
        let ratio = if seg > 0.0 { (target - self.lengths[lo]) / seg } else { 0.0 };
        self.parameters[lo] + (self.parameters[hi] - self.parameters[lo]) * ratio
    }
}

#[must_use]
pub fn curve_arc_length<C: Curve3 + ?Sized>(curve: &C, samples: usize) -> f64 {
    ArcLengthTable::build(curve, samples.max(1) + 1).total()
}

/// Divides a curve at every multiple of `spacing` along its length.
///
/// The end of the curve is always included. A multiple that lands within
/// `tol` of the end is dropped in favor of the end itself, so the final
/// interval may be shorter (or slightly longer) than `spacing`.
#[must_use]
pub fn divide_curve_by_length<C: Curve3 + ?Sized>(curve: &C, spacing: f64, tol: f64) -> CurveDivisionResult {
    let (t0, t1) = curve.domain();
    let table = ArcLengthTable::build(curve, 2048);
    let total = table.total();
    let mut result = CurveDivisionResult::default();

    if !total.is_finite() || total <= tol {
        return result;
    }
    if !(spacing.is_finite() && spacing > 0.0) {
        result.push(sample_curve_at(curve, t0));
        result.push(sample_curve_at(curve, t1));
        return result;
    }

    let mut k = 0usize;
    loop {
        let distance = k as f64 * spacing;
        if distance >= total - tol {
            break;
        }
        result.push(sample_curve_at(curve, table.parameter_at(distance)));
        k += 1;
    }
    result.push(sample_curve_at(curve, t1));
    result
}

#[must_use]
pub fn tessellate_curve_uniform<C: Curve3 + ?Sized>(curve: &C, steps: usize) -> Vec<Point3> {
    let steps = steps.max(1);
    let (t0, t1) = curve.domain();
    (0..=steps)
        .map(|i| curve.point_at(t0 + (t1 - t0) * (i as f64 / steps as f64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(count: usize) -> Vec<Point3> {
        (0..count)
            .map(|i| {
                let x = i as f64 * 2.0;
                Point3::new(x, (x * 0.4).sin() * 3.0, 0.1 * x)
            })
            .collect()
    }

    #[test]
    fn test_basis_partition_of_unity() {
        let knots = [0.0, 0.0, 0.0, 0.0, 0.3, 0.5, 0.5, 0.8, 1.0, 1.0, 1.0, 1.0];
        let n = knots.len() - 3 - 2;
        for i in 0..=20 {
            let u = i as f64 / 20.0;
            let span = find_span(n, 3, u, &knots);
            let sum: f64 = basis_functions(span, u, 3, &knots).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "u={u} sum={sum}");
        }
    }

    #[test]
    fn test_open_interpolation_hits_every_point() {
        let pts = wave(9);
        let curve = NurbsCurve3::interpolate_through_points(&pts, 3, false).expect("fit");
        let params = chord_parameters(&pts, false);
        for (p, t) in pts.iter().zip(params) {
            assert!(curve.point_at(t).distance_to(*p) < 1e-7);
        }
        assert!(curve.start_point().distance_to(pts[0]) < 1e-9);
        assert!(curve.end_point().distance_to(pts[8]) < 1e-9);
    }

    #[test]
    fn test_two_points_give_a_line() {
        let pts = [Point3::ORIGIN, Point3::new(4.0, 0.0, 2.0)];
        let curve = NurbsCurve3::interpolate_through_points(&pts, 3, false).expect("fit");
        assert_eq!(curve.degree, 1);
        assert!(curve.point_at(0.5).distance_to(Point3::new(2.0, 0.0, 1.0)) < 1e-12);
    }

    #[test]
    fn test_periodic_interpolation_closes_smoothly() {
        let pts: Vec<Point3> = (0..12)
            .map(|i| {
                let a = i as f64 / 12.0 * std::f64::consts::TAU;
                Point3::new(10.0 * a.cos(), 10.0 * a.sin(), a.sin())
            })
            .collect();
        let curve = NurbsCurve3::interpolate_through_points(&pts, 3, true).expect("fit");
        let (a, b) = curve.domain();
        assert!((a - 0.0).abs() < 1e-12 && (b - 1.0).abs() < 1e-12);
        assert!(curve.is_closed());
        let params = chord_parameters(&pts, true);
        for (p, t) in pts.iter().zip(params) {
            assert!(curve.point_at(t).distance_to(*p) < 1e-7);
        }
        let d0 = curve.derivative_at(a);
        let d1 = curve.derivative_at(b);
        assert!(d0.sub(d1).length() < 1e-6 * d0.length().max(1.0));
    }

    #[test]
    fn test_periodic_even_degree_is_lowered() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(0.0, 5.0, 0.0),
        ];
        let curve = NurbsCurve3::interpolate_through_points(&pts, 2, true).expect("fit");
        assert_eq!(curve.degree, 1);
        assert!(curve.is_closed());
    }

    #[test]
    fn test_long_open_and_periodic_fits_hit_every_point() {
        let open = wave(1500);
        let curve = NurbsCurve3::interpolate_through_points(&open, 3, false).expect("open fit");
        for (p, t) in open.iter().zip(chord_parameters(&open, false)).step_by(37) {
            assert!(curve.point_at(t).distance_to(*p) < 1e-6);
        }

        let ring: Vec<Point3> = (0..600)
            .map(|i| {
                let a = i as f64 / 600.0 * std::f64::consts::TAU;
                Point3::new(50.0 * a.cos(), 30.0 * a.sin(), (3.0 * a).sin())
            })
            .collect();
        let curve = NurbsCurve3::interpolate_through_points(&ring, 3, true).expect("periodic fit");
        assert!(curve.is_closed());
        for (p, t) in ring.iter().zip(chord_parameters(&ring, true)).step_by(29) {
            assert!(curve.point_at(t).distance_to(*p) < 1e-6);
        }
    }

    /// `4` on the diagonal and `1` either side, optionally wrapping around.
    fn tridiagonal(n: usize, cyclic: bool) -> BandedSystem {
        let mut system = BandedSystem::new(n, usize::from(cyclic));
        for i in 0..n {
            system.add(i, i, 4.0);
            if i > 0 {
                system.add(i, i - 1, 1.0);
            } else if cyclic {
                system.add(i, n - 1, 1.0);
            }
            if i + 1 < n {
                system.add(i, i + 1, 1.0);
            } else if cyclic {
                system.add(i, 0, 1.0);
            }
        }
        system
    }

    #[test]
    fn test_banded_solve_stays_narrow() {
        let n = 2000;
        let expected: Vec<Point3> = (0..n).map(|i| Point3::new(i as f64, (i % 7) as f64, -1.0)).collect();
        for cyclic in [false, true] {
            let mut system = tridiagonal(n, cyclic);
            let rhs: Vec<Point3> = (0..n)
                .map(|i| {
                    (0..n).fold(Point3::ORIGIN, |acc, k| {
                        let a = system.get(i, k);
                        if a == 0.0 { acc } else { acc.add_vec(expected[k].to_vec3().mul_scalar(a)) }
                    })
                })
                .collect();
            let solved = system.solve(&rhs).expect("solve");
            for (got, want) in solved.iter().zip(&expected) {
                assert!(got.distance_to(*want) < 1e-9, "cyclic={cyclic}: {got:?} vs {want:?}");
            }
            // The wrapped last row is dense; every other row keeps a few entries.
            assert!(system.stored() < 8 * n, "cyclic={cyclic}: {} stored", system.stored());
        }
    }

    #[test]
    fn test_banded_solve_reports_singular_systems() {
        let mut system = BandedSystem::new(3, 0);
        system.add(0, 0, 1.0);
        system.add(1, 0, 1.0);
        system.add(2, 2, 1.0);
        let rhs = [Point3::ORIGIN; 3];
        assert!(system.solve(&rhs).is_err());
    }

    #[test]
    fn test_reversed_swaps_endpoints_and_preserves_shape() {
        let curve = NurbsCurve3::interpolate_uniform(&wave(6), 3).expect("fit");
        let rev = curve.reversed();
        assert!(rev.start_point().distance_to(curve.end_point()) < 1e-9);
        assert!(rev.end_point().distance_to(curve.start_point()) < 1e-9);
        let (a, b) = curve.domain();
        let (ra, rb) = rev.domain();
        let mid = curve.point_at(a + 0.3 * (b - a));
        let rmid = rev.point_at(rb - 0.3 * (rb - ra));
        assert!(mid.distance_to(rmid) < 1e-9);
    }

    #[test]
    fn test_analytic_derivative_matches_finite_difference() {
        let curve = NurbsCurve3::interpolate_through_points(&wave(7), 3, false).expect("fit");
        for t in [0.1, 0.37, 0.5, 0.9] {
            let analytic = curve.derivative_at(t);
            let numeric = central_difference(&curve, t);
            assert!(analytic.sub(numeric).length() < 1e-3 * analytic.length().max(1.0));
        }
    }

    #[test]
    fn test_polyline_parameterization_and_reverse() {
        let line = Polyline3::new(
            vec![Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0), Point3::new(10.0, 10.0, 0.0)],
            false,
        )
        .expect("polyline");
        assert!((line.length() - 20.0).abs() < 1e-12);
        assert!(line.point_at(0.75).distance_to(Point3::new(10.0, 5.0, 0.0)) < 1e-12);
        assert_eq!(line.tangent_at(0.25), Some(Vec3::X));
        let rev = line.reversed();
        assert_eq!(rev.start_point(), Point3::new(10.0, 10.0, 0.0));
        assert_eq!(rev.end_point(), Point3::ORIGIN);
    }

    #[test]
    fn test_divide_by_length_includes_end() {
        let line = Polyline3::new(vec![Point3::ORIGIN, Point3::new(22.0, 0.0, 0.0)], false).expect("polyline");
        let division = divide_curve_by_length(&line, 5.0, 1e-3);
        let xs: Vec<f64> = division.points.iter().map(|p| p.x).collect();
        assert_eq!(xs.len(), 6);
        for (x, expected) in xs.iter().zip([0.0, 5.0, 10.0, 15.0, 20.0, 22.0]) {
            assert!((x - expected).abs() < 1e-6, "{x} vs {expected}");
        }

        let exact = Polyline3::new(vec![Point3::ORIGIN, Point3::new(20.0, 0.0, 0.0)], false).expect("polyline");
        assert_eq!(divide_curve_by_length(&exact, 5.0, 1e-3).len(), 5);
    }
}
