//! 호모그래피 추정 (정규화 DLT + RANSAC).

use nalgebra::{DMatrix, Matrix3, SMatrix, SVector, Vector3};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::trace;

use navi_core::models::geometry::Point;

/// 3×3 사영 변환 (dst ~ H · src)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// 점 변환. 무한원점으로 가면 None
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        let out = Point::new(v[0] / v[2], v[1] / v[2]);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    /// 쿼리 영역(width × height)에 대해 물리적으로 가능한 변환인지.
    ///
    /// 미니맵은 지도를 위에서 본 회전/확대 영상이므로 원근 성분이 작고(네 꼭짓점의
    /// w가 1 근처), 뒤집히지 않으며(det > 0), 한 축으로만 늘어나지 않는다.
    pub fn is_plausible(&self, width: f64, height: f64) -> bool {
        const MAX_ANISOTROPY: f64 = 3.0;

        if self.h.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let corners = [(0.0, 0.0), (0.0, height), (width, height), (width, 0.0)];
        for (x, y) in corners {
            let w = self.h[(2, 0)] * x + self.h[(2, 1)] * y + self.h[(2, 2)];
            if !(0.8..=1.25).contains(&w) {
                return false;
            }
        }
        let (a, b, c, d) = (self.h[(0, 0)], self.h[(0, 1)], self.h[(1, 0)], self.h[(1, 1)]);
        let det = a * d - b * c;
        if !(1e-2..=1e2).contains(&det) {
            return false;
        }
        // 선형부 특이값 비 s1/s2 (s1² + s2² = frob, s1·s2 = det)
        let frob = a * a + b * b + c * c + d * d;
        let disc = (frob * frob - 4.0 * det * det).max(0.0).sqrt();
        let s1_sq = (frob + disc) / 2.0;
        let s2_sq = (frob - disc) / 2.0;
        s2_sq > 0.0 && s1_sq <= MAX_ANISOTROPY * MAX_ANISOTROPY * s2_sq
    }
}

// ============================================================
// DLT
// ============================================================

/// Hartley 정규화: 중심을 원점으로, 평균 거리를 √2로
fn normalize_points(pts: &[Point]) -> (Vec<Point>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        2.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (out, t)
}

fn denormalize(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / s))
}

/// 대응점 4쌍으로 정확한 해 (h33 = 1 고정, 8×8 선형계)
pub fn homography_from_4pt(src: &[Point; 4], dst: &[Point; 4]) -> Option<Homography> {
    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y, u, v) = (s[k].x, s[k].y, d[k].x, d[k].y);
        let r = 2 * k;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let sol = a.lu().solve(&b)?;
    let hn = Matrix3::new(
        sol[0], sol[1], sol[2], sol[3], sol[4], sol[5], sol[6], sol[7], 1.0,
    );
    denormalize(hn, ts, td)
}

/// 최소제곱 해 (대응점 5쌍 이상, SVD 최소 특이벡터)
pub fn estimate_homography(src: &[Point], dst: &[Point]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if src.len() == 4 {
        let s: [Point; 4] = src.try_into().ok()?;
        let d: [Point; 4] = dst.try_into().ok()?;
        return homography_from_4pt(&s, &d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y, u, v) = (s[k].x, s[k].y, d[k].x, d[k].y);
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    // 특이값 정렬 순서에 의존하지 않도록 최소 특이값의 행을 직접 찾는다
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = vt.row(min_idx);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    denormalize(hn, ts, td)
}

// ============================================================
// RANSAC
// ============================================================

/// RANSAC 파라미터
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// 재투영 오차 허용치 (픽셀)
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    /// 조기 종료 신뢰도
    pub confidence: f64,
    /// 채택에 필요한 최소 인라이어 수
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reprojection_threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            min_inliers: 4,
            seed: 0x5EED,
        }
    }
}

/// RANSAC 결과
#[derive(Debug, Clone)]
pub struct RansacResult {
    pub homography: Homography,
    /// 인라이어 대응 인덱스
    pub inliers: Vec<usize>,
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// 네 점 중 세 점이 한 직선 위에 있으면 퇴화
fn is_degenerate(p: &[Point; 4]) -> bool {
    const MIN_AREA: f64 = 1.0;
    [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)]
        .iter()
        .any(|&(i, j, k)| cross(&p[i], &p[j], &p[k]).abs() < MIN_AREA)
}

fn collect_inliers(h: &Homography, src: &[Point], dst: &[Point], threshold: f64) -> Vec<usize> {
    let t2 = threshold * threshold;
    src.iter()
        .zip(dst)
        .enumerate()
        .filter_map(|(i, (s, d))| {
            let p = h.apply(*s)?;
            let e2 = (p.x - d.x).powi(2) + (p.y - d.y).powi(2);
            (e2 <= t2).then_some(i)
        })
        .collect()
}

fn required_iterations(inlier_ratio: f64, confidence: f64, max: usize) -> usize {
    let p_all = inlier_ratio.powi(4);
    if p_all <= f64::EPSILON {
        return max;
    }
    if p_all >= 1.0 - f64::EPSILON {
        return 1;
    }
    let n = (1.0 - confidence).ln() / (1.0 - p_all).ln();
    (n.ceil() as usize).clamp(1, max)
}

/// 이상치가 섞인 대응점에서 강건하게 호모그래피 추정.
///
/// 대응이 4쌍 미만이거나 최소 인라이어를 못 채우면 None.
pub fn find_homography_ransac(
    src: &[Point],
    dst: &[Point],
    params: &RansacParams,
) -> Option<RansacResult> {
    let n = src.len();
    if n != dst.len() || n < 4 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, Vec<usize>)> = None;
    let mut needed = params.max_iterations;
    let mut iter = 0;

    while iter < needed {
        iter += 1;

        let mut idx = [0usize; 4];
        let mut k = 0;
        while k < 4 {
            let candidate = rng.random_range(0..n);
            if !idx[..k].contains(&candidate) {
                idx[k] = candidate;
                k += 1;
            }
        }
        let s = idx.map(|i| src[i]);
        let d = idx.map(|i| dst[i]);
        if is_degenerate(&s) || is_degenerate(&d) {
            continue;
        }
        let Some(h) = homography_from_4pt(&s, &d) else {
            continue;
        };
        let inliers = collect_inliers(&h, src, dst, params.reprojection_threshold);
        if best.as_ref().map_or(true, |(_, b)| inliers.len() > b.len()) {
            needed = required_iterations(
                inliers.len() as f64 / n as f64,
                params.confidence,
                params.max_iterations,
            );
            best = Some((h, inliers));
        }
    }

    let (mut h, mut inliers) = best?;
    trace!(iterations = iter, inliers = inliers.len(), total = n, "RANSAC 종료");

    // 인라이어 전체로 재추정. 더 나빠지면 최소 표본 해를 유지
    if inliers.len() > 4 {
        let s: Vec<Point> = inliers.iter().map(|&i| src[i]).collect();
        let d: Vec<Point> = inliers.iter().map(|&i| dst[i]).collect();
        if let Some(refined) = estimate_homography(&s, &d) {
            let refined_inliers =
                collect_inliers(&refined, src, dst, params.reprojection_threshold);
            if refined_inliers.len() >= inliers.len() {
                h = refined;
                inliers = refined_inliers;
            }
        }
    }

    if inliers.len() < params.min_inliers.max(4) {
        trace!(inliers = inliers.len(), min = params.min_inliers, "인라이어 부족");
        return None;
    }
    Some(RansacResult {
        homography: h,
        inliers,
    })
}
