//! 방향 계산.
//!
//! 각도는 화면 좌표계 기준 도 단위, 시계방향이 양수, 0 = +x.

use navi_core::models::geometry::Point;

/// `from`에서 `to`를 바라보는 방향 [0, 360)
pub fn target_heading(from: Point, to: Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees().rem_euclid(360.0)
}

/// 현재 방향과 목표 방향의 차이 [-180, 180). 양수면 목표가 반시계 쪽
pub fn angle_diff(current: f64, target: f64) -> f64 {
    (current - target + 180.0).rem_euclid(360.0) - 180.0
}

/// 오차 크기에 따른 회전 계수
pub fn control_ratio(diff: f64) -> f64 {
    let d = diff.abs();
    if d > 90.0 {
        5.0
    } else if d > 30.0 {
        3.0
    } else if d > 5.0 {
        2.0
    } else {
        1.0
    }
}

/// 오차를 상쇄하는 마우스 이동량
pub fn turn_amount(current: f64, target: f64) -> i32 {
    let diff = angle_diff(current, target);
    -(control_ratio(diff) * diff).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_quadrants() {
        let o = Point::ZERO;
        assert!((target_heading(o, Point::new(10.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((target_heading(o, Point::new(0.0, 10.0)) - 90.0).abs() < 1e-9);
        assert!((target_heading(o, Point::new(-10.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((target_heading(o, Point::new(0.0, -10.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn diff_wraps() {
        assert!((angle_diff(350.0, 10.0) - (-20.0)).abs() < 1e-9);
        assert!((angle_diff(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((angle_diff(90.0, 270.0) - (-180.0)).abs() < 1e-9);
        assert_eq!(angle_diff(45.0, 45.0), 0.0);
    }

    #[test]
    fn ratio_bands() {
        assert_eq!(control_ratio(120.0), 5.0);
        assert_eq!(control_ratio(-45.0), 3.0);
        assert_eq!(control_ratio(10.0), 2.0);
        assert_eq!(control_ratio(3.0), 1.0);
    }

    #[test]
    fn turn_sign_reduces_error() {
        // 현재 0°, 목표 20° → 시계방향(오른쪽)으로 돌아야 함
        assert_eq!(turn_amount(0.0, 20.0), 40);
        assert_eq!(turn_amount(20.0, 0.0), -40);
        assert_eq!(turn_amount(0.0, 3.0), 3);
    }
}
