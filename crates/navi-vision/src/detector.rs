//! 특징점 검출 + 디스크립터 계산.
//!
//! 2×2 박스 평균으로 만든 피라미드의 각 옥타브에서 후보점을 찾고,
//! 기울기 히스토그램으로 주 방향을 정한 뒤 회전 정규화된 디스크립터를 만든다.
//!
//! - `Sift`: FAST-9 코너 + 4×4×8 기울기 히스토그램 (128차원)
//! - `Surf`: 헤시안 행렬식 극대점 + 4×4 Haar 합 (64차원)

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::debug;

use navi_core::config::LocalizerConfig;
use navi_core::models::features::{DescriptorMatrix, DetectorKind, FeatureSet, KeyPoint};

type GradientImage = ImageBuffer<Luma<i16>, Vec<i16>>;

/// 피라미드 블러 시그마
const BLUR_SIGMA: f32 = 1.2;

/// 주 방향 히스토그램 빈 수
const ORIENTATION_BINS: usize = 36;

/// 주 방향 계산 반경 (옥타브 픽셀)
const ORIENTATION_RADIUS: i32 = 8;

/// 128차원 디스크립터 성분 상한 (조명 변화 완화)
const SIFT_CLIP: f32 = 0.2;

/// 검출 파라미터
#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub kind: DetectorKind,
    /// FAST 코너 임계값 (Sift)
    pub fast_threshold: u8,
    /// 헤시안 행렬식 임계값 (Surf)
    pub hessian_threshold: f32,
    /// 피라미드 옥타브 수
    pub octaves: u8,
    /// 옥타브 이미지 가장자리 제외 폭
    pub border: u32,
    /// 응답 상위 N개만 유지 (None이면 전부)
    pub max_features: Option<usize>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Sift,
            fast_threshold: 12,
            hessian_threshold: 100.0,
            octaves: 3,
            border: 16,
            max_features: None,
        }
    }
}

/// 스케일/회전 불변 특징 검출기
#[derive(Debug, Clone, Default)]
pub struct FeatureDetector {
    params: DetectorParams,
}

impl FeatureDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    /// 설정에서 생성
    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self::new(DetectorParams {
            kind: config.detector,
            fast_threshold: config.fast_threshold,
            hessian_threshold: config.surf_hessian_threshold,
            ..DetectorParams::default()
        })
    }

    pub fn kind(&self) -> DetectorKind {
        self.params.kind
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// 특징점과 디스크립터 검출.
    ///
    /// `mask`가 주어지면 원본 해상도 기준으로 0이 아닌 위치의 특징만 남긴다.
    pub fn detect(&self, image: &GrayImage, mask: Option<&GrayImage>) -> FeatureSet {
        let desc_len = self.params.kind.descriptor_len();
        let mut found: Vec<(KeyPoint, Vec<f32>)> = Vec::new();

        let mut level = image.clone();
        for octave in 0..self.params.octaves {
            let min_side = 2 * self.params.border + 8;
            if level.width() < min_side || level.height() < min_side {
                break;
            }
            if octave > 0 {
                level = downsample(&level);
                if level.width() < min_side || level.height() < min_side {
                    break;
                }
            }
            self.detect_octave(&level, octave, mask, &mut found);
        }

        // 응답 내림차순, 동점은 위치로 정렬해 결과를 결정적으로 만든다
        found.sort_by(|a, b| {
            b.0.response
                .total_cmp(&a.0.response)
                .then(a.0.octave.cmp(&b.0.octave))
                .then(a.0.y.total_cmp(&b.0.y))
                .then(a.0.x.total_cmp(&b.0.x))
        });
        if let Some(limit) = self.params.max_features {
            found.truncate(limit);
        }

        let mut descriptors = DescriptorMatrix::with_capacity(desc_len, found.len());
        let mut keypoints = Vec::with_capacity(found.len());
        for (kp, desc) in found {
            descriptors.push_row(&desc);
            keypoints.push(kp);
        }

        debug!(
            kind = %self.params.kind,
            width = image.width(),
            height = image.height(),
            count = keypoints.len(),
            "특징점 검출 완료"
        );

        FeatureSet {
            keypoints,
            descriptors,
        }
    }

    fn detect_octave(
        &self,
        level: &GrayImage,
        octave: u8,
        mask: Option<&GrayImage>,
        out: &mut Vec<(KeyPoint, Vec<f32>)>,
    ) {
        let blurred = gaussian_blur_f32(level, BLUR_SIGMA);
        let gx = horizontal_sobel(&blurred);
        let gy = vertical_sobel(&blurred);
        let scale = (1u32 << octave) as f32;
        let offset = (scale - 1.0) / 2.0;

        let candidates = match self.params.kind {
            DetectorKind::Sift => fast_candidates(&blurred, self.params.fast_threshold),
            DetectorKind::Surf => hessian_candidates(&blurred, self.params.hessian_threshold),
        };

        let (w, h) = level.dimensions();
        let border = self.params.border;
        for (x, y, response) in candidates {
            if x < border || y < border || x >= w - border || y >= h - border {
                continue;
            }
            let full_x = x as f32 * scale + offset;
            let full_y = y as f32 * scale + offset;
            if let Some(mask) = mask {
                if !mask_allows(mask, full_x, full_y) {
                    continue;
                }
            }

            let angle = dominant_orientation(&gx, &gy, x as i32, y as i32);
            let descriptor = match self.params.kind {
                DetectorKind::Sift => gradient_histogram_descriptor(&gx, &gy, x, y, angle),
                DetectorKind::Surf => haar_sum_descriptor(&gx, &gy, x, y, angle),
            };
            let Some(descriptor) = descriptor else {
                continue;
            };

            out.push((
                KeyPoint {
                    x: full_x,
                    y: full_y,
                    size: 16.0 * scale,
                    angle: angle.to_degrees().rem_euclid(360.0),
                    response,
                    octave,
                },
                descriptor,
            ));
        }
    }
}

// ============================================================
// 피라미드 / 후보점
// ============================================================

/// 2×2 박스 평균 축소 (홀수 가장자리는 버림)
fn downsample(src: &GrayImage) -> GrayImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    GrayImage::from_fn(w, h, |x, y| {
        let (sx, sy) = (2 * x, 2 * y);
        let sum = src.get_pixel(sx, sy)[0] as u16
            + src.get_pixel(sx + 1, sy)[0] as u16
            + src.get_pixel(sx, sy + 1)[0] as u16
            + src.get_pixel(sx + 1, sy + 1)[0] as u16;
        Luma([((sum + 2) / 4) as u8])
    })
}

/// FAST-9 코너 + 3×3 비최대 억제
fn fast_candidates(image: &GrayImage, threshold: u8) -> Vec<(u32, u32, f32)> {
    let corners = corners_fast9(image, threshold);
    let (w, h) = image.dimensions();
    let mut score = vec![0.0f32; (w * h) as usize];
    for c in &corners {
        score[(c.y * w + c.x) as usize] = c.score;
    }
    corners
        .iter()
        .filter(|c| is_local_max(&score, w, h, c.x, c.y))
        .map(|c| (c.x, c.y, c.score))
        .collect()
}

/// 헤시안 행렬식 극대점
fn hessian_candidates(image: &GrayImage, threshold: f32) -> Vec<(u32, u32, f32)> {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }
    let px = |x: u32, y: u32| image.get_pixel(x, y)[0] as f32;
    let mut det = vec![0.0f32; (w * h) as usize];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = px(x, y);
            let dxx = px(x + 1, y) - 2.0 * c + px(x - 1, y);
            let dyy = px(x, y + 1) - 2.0 * c + px(x, y - 1);
            let dxy = (px(x + 1, y + 1) - px(x - 1, y + 1) - px(x + 1, y - 1)
                + px(x - 1, y - 1))
                / 4.0;
            let d = dxx * dyy - (0.9 * dxy).powi(2);
            if d > threshold {
                det[(y * w + x) as usize] = d;
            }
        }
    }

    let mut out = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let d = det[(y * w + x) as usize];
            if d > 0.0 && is_local_max(&det, w, h, x, y) {
                out.push((x, y, d));
            }
        }
    }
    out
}

/// 3×3 이웃 중 최대인지. 동점은 스캔 순서상 먼저인 점이 이긴다
fn is_local_max(score: &[f32], w: u32, h: u32, x: u32, y: u32) -> bool {
    let s = score[(y * w + x) as usize];
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            if nx == x && ny == y {
                continue;
            }
            let n = score[(ny * w + nx) as usize];
            let earlier = (ny, nx) < (y, x);
            if n > s || (n == s && earlier) {
                return false;
            }
        }
    }
    true
}

fn mask_allows(mask: &GrayImage, x: f32, y: f32) -> bool {
    let (mx, my) = (x.round() as i64, y.round() as i64);
    if mx < 0 || my < 0 || mx >= mask.width() as i64 || my >= mask.height() as i64 {
        return false;
    }
    mask.get_pixel(mx as u32, my as u32)[0] != 0
}

// ============================================================
// 방향 / 디스크립터
// ============================================================

fn gradient_at(gx: &GradientImage, gy: &GradientImage, x: i32, y: i32) -> Option<(f32, f32)> {
    if x < 0 || y < 0 || x >= gx.width() as i32 || y >= gx.height() as i32 {
        return None;
    }
    Some((
        gx.get_pixel(x as u32, y as u32)[0] as f32,
        gy.get_pixel(x as u32, y as u32)[0] as f32,
    ))
}

/// 가우시안 가중 기울기 방향 히스토그램의 최빈 방향 (라디안)
fn dominant_orientation(gx: &GradientImage, gy: &GradientImage, x: i32, y: i32) -> f32 {
    let mut hist = [0.0f32; ORIENTATION_BINS];
    let sigma2 = 2.0 * (ORIENTATION_RADIUS as f32 / 2.0).powi(2);
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let Some((gxv, gyv)) = gradient_at(gx, gy, x + dx, y + dy) else {
                continue;
            };
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag == 0.0 {
                continue;
            }
            let weight = (-((dx * dx + dy * dy) as f32) / sigma2).exp();
            let theta = gyv.atan2(gxv).rem_euclid(std::f32::consts::TAU);
            let bin = ((theta / std::f32::consts::TAU) * ORIENTATION_BINS as f32) as usize
                % ORIENTATION_BINS;
            hist[bin] += mag * weight;
        }
    }

    // 1-2-1 평활화
    let smoothed: Vec<f32> = (0..ORIENTATION_BINS)
        .map(|i| {
            let prev = hist[(i + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
            let next = hist[(i + 1) % ORIENTATION_BINS];
            (prev + 2.0 * hist[i] + next) / 4.0
        })
        .collect();

    let (peak, _) = smoothed
        .iter()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });

    // 포물선 보간으로 빈 내부 위치 추정
    let l = smoothed[(peak + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
    let c = smoothed[peak];
    let r = smoothed[(peak + 1) % ORIENTATION_BINS];
    let denom = l - 2.0 * c + r;
    let shift = if denom.abs() > f32::EPSILON {
        (0.5 * (l - r) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    ((peak as f32 + 0.5 + shift) / ORIENTATION_BINS as f32) * std::f32::consts::TAU
}

/// 주 방향 기준 회전 좌표계의 샘플 위치 (최근접 픽셀)
fn rotated_sample(x: u32, y: u32, u: f32, v: f32, cos: f32, sin: f32) -> (i32, i32) {
    let sx = x as f32 + u * cos - v * sin;
    let sy = y as f32 + u * sin + v * cos;
    (sx.round() as i32, sy.round() as i32)
}

/// 16×16 패치, 4×4 셀 × 8 방향 빈 → 128차원
fn gradient_histogram_descriptor(
    gx: &GradientImage,
    gy: &GradientImage,
    x: u32,
    y: u32,
    angle: f32,
) -> Option<Vec<f32>> {
    let (sin, cos) = angle.sin_cos();
    let mut desc = vec![0.0f32; 128];
    let sigma2 = 2.0 * 8.0f32.powi(2);

    for j in 0..16 {
        for i in 0..16 {
            let u = i as f32 - 7.5;
            let v = j as f32 - 7.5;
            let (sx, sy) = rotated_sample(x, y, u, v, cos, sin);
            let (gxv, gyv) = gradient_at(gx, gy, sx, sy)?;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag == 0.0 {
                continue;
            }
            let theta = (gyv.atan2(gxv) - angle).rem_euclid(std::f32::consts::TAU);
            let bin = ((theta / std::f32::consts::TAU) * 8.0) as usize % 8;
            let weight = (-(u * u + v * v) / sigma2).exp();
            let cell = (j / 4) * 4 + (i / 4);
            desc[cell * 8 + bin] += mag * weight;
        }
    }

    if !normalize(&mut desc) {
        return None;
    }
    for d in desc.iter_mut() {
        *d = d.min(SIFT_CLIP);
    }
    normalize(&mut desc).then_some(desc)
}

/// 20×20 패치, 4×4 부분영역마다 (Σdx, Σdy, Σ|dx|, Σ|dy|) → 64차원
fn haar_sum_descriptor(
    gx: &GradientImage,
    gy: &GradientImage,
    x: u32,
    y: u32,
    angle: f32,
) -> Option<Vec<f32>> {
    let (sin, cos) = angle.sin_cos();
    let mut desc = vec![0.0f32; 64];
    let sigma2 = 2.0 * 10.0f32.powi(2);

    for j in 0..20 {
        for i in 0..20 {
            let u = i as f32 - 9.5;
            let v = j as f32 - 9.5;
            let (sx, sy) = rotated_sample(x, y, u, v, cos, sin);
            let (gxv, gyv) = gradient_at(gx, gy, sx, sy)?;
            let weight = (-(u * u + v * v) / sigma2).exp();
            let dx = (gxv * cos + gyv * sin) * weight;
            let dy = (-gxv * sin + gyv * cos) * weight;
            let cell = (j / 5) * 4 + (i / 5);
            desc[cell * 4] += dx;
            desc[cell * 4 + 1] += dy;
            desc[cell * 4 + 2] += dx.abs();
            desc[cell * 4 + 3] += dy.abs();
        }
    }

    normalize(&mut desc).then_some(desc)
}

/// L2 정규화. 노름이 0이면 false
fn normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
}
