//! 애플리케이션 설정.
//!
//! 모든 필드는 serde 기본값을 가지므로 설정 파일에는 바꾸려는 값만 적으면 된다.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::features::DetectorKind;
use crate::models::geometry::{Point, Rect};
use crate::models::input::GameAction;

/// 최상위 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub localizer: LocalizerConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub minimap: MinimapConfig,
    #[serde(default)]
    pub map_transform: MapTransform,
    #[serde(default)]
    pub key_bindings: KeyBindings,
}

// ============================================================
// 디스패처 설정
// ============================================================

/// 캡처 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// 캡처 후 트리거 실행
    #[default]
    NormalTrigger,
    /// 캡처 후 캐시에 저장하고 트리거 실행
    CacheCaptureWithTrigger,
    /// 캡처 후 캐시에만 저장 (트리거 실행 안 함)
    OnlyCacheCapture,
}

impl CaptureMode {
    /// 이 모드에서 프레임을 캐시하는지
    pub fn caches_frames(&self) -> bool {
        matches!(
            self,
            CaptureMode::CacheCaptureWithTrigger | CaptureMode::OnlyCacheCapture
        )
    }
}

/// 캡처/디스패치 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 틱 주기 (밀리초)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 시작 캡처 모드
    #[serde(default)]
    pub capture_mode: CaptureMode,
    /// 리소스 회수 최소 간격 (밀리초)
    #[serde(default = "default_reclaim_interval_ms")]
    pub reclaim_interval_ms: u64,
    /// 프레임 번호 순환 주기 (초)
    #[serde(default = "default_frame_index_period_secs")]
    pub frame_index_period_secs: u64,
    /// 스크린샷 저장 디렉토리 (None이면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            capture_mode: CaptureMode::default(),
            reclaim_interval_ms: default_reclaim_interval_ms(),
            frame_index_period_secs: default_frame_index_period_secs(),
            screenshot_dir: None,
        }
    }
}

impl DispatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    /// 프레임 번호가 0으로 돌아가는 주기 (틱 수)
    pub fn frame_index_modulus(&self) -> u64 {
        (self.frame_index_period_secs * 1000 / self.interval_ms.max(1)).max(1)
    }
}

// ============================================================
// 로컬라이저 설정
// ============================================================

/// 특징 인덱스/로컬라이저 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizerConfig {
    /// 특징 검출기 종류
    #[serde(default)]
    pub detector: DetectorKind,
    /// SURF 계열 헤시안 임계값
    #[serde(default = "default_surf_hessian_threshold")]
    pub surf_hessian_threshold: f32,
    /// SIFT 계열 FAST 코너 임계값
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u8,
    /// 참조 지도의 논리 행 수
    #[serde(default = "default_map_rows")]
    pub map_rows: u32,
    /// 참조 지도의 논리 열 수
    #[serde(default = "default_map_cols")]
    pub map_cols: u32,
    /// 격자 분할 배수 (격자 = 논리 행/열 × 배수)
    #[serde(default = "default_split_factor")]
    pub split_factor: u32,
    /// RANSAC 재투영 허용 오차 (픽셀)
    #[serde(default = "default_ransac_reprojection_px")]
    pub ransac_reprojection_px: f64,
    /// RANSAC 모델 채택 최소 인라이어 수 (4 미만은 4로 취급)
    #[serde(default = "default_ransac_min_inliers")]
    pub ransac_min_inliers: usize,
    /// 비율 테스트 계수
    #[serde(default = "default_ratio_test")]
    pub ratio_test: f32,
    /// 비율 테스트 최소 매칭 수
    #[serde(default = "default_min_ratio_matches")]
    pub min_ratio_matches: usize,
    /// 거리 필터 하한
    #[serde(default = "default_distance_floor")]
    pub distance_floor: f32,
    /// 참조 지도 이미지 경로
    #[serde(default)]
    pub reference_image: Option<PathBuf>,
    /// 저장 식별자
    #[serde(default = "default_feature_name")]
    pub feature_name: String,
    /// 특징점 저장 디렉토리 (None이면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub feature_dir: Option<PathBuf>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            surf_hessian_threshold: default_surf_hessian_threshold(),
            fast_threshold: default_fast_threshold(),
            map_rows: default_map_rows(),
            map_cols: default_map_cols(),
            split_factor: default_split_factor(),
            ransac_reprojection_px: default_ransac_reprojection_px(),
            ransac_min_inliers: default_ransac_min_inliers(),
            ratio_test: default_ratio_test(),
            min_ratio_matches: default_min_ratio_matches(),
            distance_floor: default_distance_floor(),
            reference_image: None,
            feature_name: default_feature_name(),
            feature_dir: None,
        }
    }
}

impl LocalizerConfig {
    /// 격자 (행, 열)
    pub fn grid(&self) -> (u32, u32) {
        (
            self.map_rows * self.split_factor,
            self.map_cols * self.split_factor,
        )
    }
}

// ============================================================
// 내비게이션 설정
// ============================================================

/// 경로점 추종 컨트롤러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// 접근 단계 도착 거리
    #[serde(default = "default_approach_arrive_distance")]
    pub approach_arrive_distance: f64,
    /// 접근 단계 이탈 거리 (이보다 멀면 포기)
    #[serde(default = "default_approach_max_distance")]
    pub approach_max_distance: f64,
    /// 접근 단계 제한 시간 (밀리초)
    #[serde(default = "default_approach_timeout_ms")]
    pub approach_timeout_ms: u64,
    /// 달리기 전환 거리
    #[serde(default = "default_run_distance")]
    pub run_distance: f64,
    /// 정지 감지 샘플 간격 (밀리초)
    #[serde(default = "default_stuck_sample_interval_ms")]
    pub stuck_sample_interval_ms: u64,
    /// 정지 감지 샘플 창 크기
    #[serde(default = "default_stuck_window")]
    pub stuck_window: usize,
    /// 정지로 판단하는 누적 이동량 (|Δx|+|Δy|)
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: f64,
    /// 접근 단계 회전 허용 오차 (도)
    #[serde(default = "default_approach_rotation_tolerance")]
    pub approach_rotation_tolerance: f64,
    /// 정밀 단계 회전 허용 오차 (도)
    #[serde(default = "default_refine_rotation_tolerance")]
    pub refine_rotation_tolerance: f64,
    /// 회전 대기 최대 시도 횟수
    #[serde(default = "default_rotation_attempts")]
    pub rotation_attempts: u32,
    /// 회전 대기 시도 간격 (밀리초)
    #[serde(default = "default_rotation_poll_ms")]
    pub rotation_poll_ms: u64,
    /// 정밀 단계 도착 거리
    #[serde(default = "default_refine_arrive_distance")]
    pub refine_arrive_distance: f64,
    /// 정밀 단계 최대 스텝 수
    #[serde(default = "default_refine_max_steps")]
    pub refine_max_steps: u32,
    /// 첫 경로점을 텔레포트로 강제
    #[serde(default = "default_true")]
    pub teleport_first_waypoint: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            approach_arrive_distance: default_approach_arrive_distance(),
            approach_max_distance: default_approach_max_distance(),
            approach_timeout_ms: default_approach_timeout_ms(),
            run_distance: default_run_distance(),
            stuck_sample_interval_ms: default_stuck_sample_interval_ms(),
            stuck_window: default_stuck_window(),
            stuck_threshold: default_stuck_threshold(),
            approach_rotation_tolerance: default_approach_rotation_tolerance(),
            refine_rotation_tolerance: default_refine_rotation_tolerance(),
            rotation_attempts: default_rotation_attempts(),
            rotation_poll_ms: default_rotation_poll_ms(),
            refine_arrive_distance: default_refine_arrive_distance(),
            refine_max_steps: default_refine_max_steps(),
            teleport_first_waypoint: true,
        }
    }
}

impl NavigationConfig {
    pub fn approach_timeout(&self) -> Duration {
        Duration::from_millis(self.approach_timeout_ms)
    }

    pub fn stuck_sample_interval(&self) -> Duration {
        Duration::from_millis(self.stuck_sample_interval_ms)
    }

    pub fn rotation_poll(&self) -> Duration {
        Duration::from_millis(self.rotation_poll_ms)
    }
}

// ============================================================
// 미니맵 / 좌표 변환 / 키 바인딩
// ============================================================

/// 캡처 프레임 안의 미니맵 영역 (프레임 좌상단 기준)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimapConfig {
    #[serde(default = "default_minimap_rect")]
    pub rect: Rect,
}

impl Default for MinimapConfig {
    fn default() -> Self {
        Self {
            rect: default_minimap_rect(),
        }
    }
}

/// 저장 좌표계 → 참조 이미지 좌표계 변환.
///
/// `ref = origin + sign * scale * game`, `invert_axes`이면 sign = -1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapTransform {
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    #[serde(default = "default_map_scale")]
    pub scale: f64,
    #[serde(default)]
    pub invert_axes: bool,
}

impl Default for MapTransform {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            scale: default_map_scale(),
            invert_axes: false,
        }
    }
}

impl MapTransform {
    pub fn to_reference(&self, x: f64, y: f64) -> Point {
        let k = if self.invert_axes {
            -self.scale
        } else {
            self.scale
        };
        Point::new(self.origin_x + k * x, self.origin_y + k * y)
    }
}

/// 논리 명령 → 키 이름. `mouse_left`, `mouse_right`는 마우스 버튼
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_key_forward")]
    pub move_forward: String,
    #[serde(default = "default_key_backward")]
    pub move_backward: String,
    #[serde(default = "default_key_left")]
    pub move_left: String,
    #[serde(default = "default_key_right")]
    pub move_right: String,
    #[serde(default = "default_key_jump")]
    pub jump: String,
    #[serde(default = "default_key_sprint")]
    pub sprint: String,
    #[serde(default = "default_key_attack")]
    pub attack: String,
    #[serde(default = "default_key_cancel_climb")]
    pub cancel_climb: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            move_forward: default_key_forward(),
            move_backward: default_key_backward(),
            move_left: default_key_left(),
            move_right: default_key_right(),
            jump: default_key_jump(),
            sprint: default_key_sprint(),
            attack: default_key_attack(),
            cancel_climb: default_key_cancel_climb(),
        }
    }
}

impl KeyBindings {
    pub fn key_for(&self, action: GameAction) -> &str {
        match action {
            GameAction::MoveForward => &self.move_forward,
            GameAction::MoveBackward => &self.move_backward,
            GameAction::MoveLeft => &self.move_left,
            GameAction::MoveRight => &self.move_right,
            GameAction::Jump => &self.jump,
            GameAction::Sprint => &self.sprint,
            GameAction::Attack => &self.attack,
            GameAction::CancelClimb => &self.cancel_climb,
        }
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 값 범위 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        fn invalid(field: &str, message: &str) -> CoreError {
            CoreError::Validation {
                field: field.to_string(),
                message: message.to_string(),
            }
        }

        if self.dispatcher.interval_ms == 0 {
            return Err(invalid("dispatcher.interval_ms", "0보다 커야 합니다"));
        }
        if self.localizer.map_rows == 0 || self.localizer.map_cols == 0 {
            return Err(invalid("localizer.map_rows/map_cols", "0보다 커야 합니다"));
        }
        if self.localizer.split_factor == 0 {
            return Err(invalid("localizer.split_factor", "0보다 커야 합니다"));
        }
        if !(self.localizer.ratio_test > 0.0 && self.localizer.ratio_test < 1.0) {
            return Err(invalid("localizer.ratio_test", "0과 1 사이여야 합니다"));
        }
        if self.localizer.ransac_reprojection_px <= 0.0 {
            return Err(invalid(
                "localizer.ransac_reprojection_px",
                "0보다 커야 합니다",
            ));
        }
        if self.navigation.stuck_window < 2 {
            return Err(invalid("navigation.stuck_window", "2 이상이어야 합니다"));
        }
        if self.map_transform.scale == 0.0 {
            return Err(invalid("map_transform.scale", "0이 아니어야 합니다"));
        }
        Ok(())
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_interval_ms() -> u64 {
    50
}
fn default_reclaim_interval_ms() -> u64 {
    2000
}
fn default_frame_index_period_secs() -> u64 {
    60
}
fn default_surf_hessian_threshold() -> f32 {
    100.0
}
fn default_fast_threshold() -> u8 {
    12
}
fn default_map_rows() -> u32 {
    13
}
fn default_map_cols() -> u32 {
    14
}
fn default_split_factor() -> u32 {
    2
}
fn default_ransac_reprojection_px() -> f64 {
    3.0
}
fn default_ransac_min_inliers() -> usize {
    4
}
fn default_ratio_test() -> f32 {
    0.75
}
fn default_min_ratio_matches() -> usize {
    7
}
fn default_distance_floor() -> f32 {
    0.02
}
fn default_feature_name() -> String {
    "mainmap".to_string()
}
fn default_approach_arrive_distance() -> f64 {
    4.0
}
fn default_approach_max_distance() -> f64 {
    500.0
}
fn default_approach_timeout_ms() -> u64 {
    30_000
}
fn default_run_distance() -> f64 {
    20.0
}
fn default_stuck_sample_interval_ms() -> u64 {
    1000
}
fn default_stuck_window() -> usize {
    8
}
fn default_stuck_threshold() -> f64 {
    3.0
}
fn default_approach_rotation_tolerance() -> f64 {
    5.0
}
fn default_refine_rotation_tolerance() -> f64 {
    2.0
}
fn default_rotation_attempts() -> u32 {
    50
}
fn default_rotation_poll_ms() -> u64 {
    50
}
fn default_refine_arrive_distance() -> f64 {
    2.0
}
fn default_refine_max_steps() -> u32 {
    8
}
fn default_true() -> bool {
    true
}
fn default_minimap_rect() -> Rect {
    Rect::new(62, 19, 212, 212)
}
fn default_map_scale() -> f64 {
    1.0
}
fn default_key_forward() -> String {
    "w".to_string()
}
fn default_key_backward() -> String {
    "s".to_string()
}
fn default_key_left() -> String {
    "a".to_string()
}
fn default_key_right() -> String {
    "d".to_string()
}
fn default_key_jump() -> String {
    "space".to_string()
}
fn default_key_sprint() -> String {
    "mouse_right".to_string()
}
fn default_key_attack() -> String {
    "mouse_left".to_string()
}
fn default_key_cancel_climb() -> String {
    "x".to_string()
}
