//! 좌표, 사각형, 사변형.

use serde::{Deserialize, Serialize};

/// 2D 좌표 (참조 이미지 픽셀 단위)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 유클리드 거리
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// |Δx| + |Δy|
    pub fn manhattan_to(&self, other: &Point) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// 정수 사각형 (캡처 영역, 미니맵 영역 등)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 크기만 비교 (위치 이동은 무시)
    pub fn same_size(&self, other: &Rect) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// 너비와 높이가 모두 0보다 큰지
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// 점 집합을 감싸는 최소 사각형
    pub fn bounding(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        let x = min_x.floor() as i32;
        let y = min_y.floor() as i32;
        Some(Rect {
            x,
            y,
            width: (max_x.ceil() as i32 - x).max(0) as u32,
            height: (max_y.ceil() as i32 - y).max(0) as u32,
        })
    }
}

/// 쿼리 이미지가 참조 이미지 안에서 차지하는 사변형.
///
/// 꼭짓점 순서는 쿼리 자체의 좌상단, 좌하단, 우하단, 우상단.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point; 4],
}

impl Quad {
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    pub fn top_left(&self) -> Point {
        self.corners[0]
    }

    pub fn bottom_left(&self) -> Point {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    pub fn top_right(&self) -> Point {
        self.corners[3]
    }

    /// 네 꼭짓점의 평균
    pub fn centroid(&self) -> Point {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }

    /// 쿼리의 "위쪽" 방향 각도 (도, 화면 좌표계 시계방향, 0 = +x)
    pub fn up_heading(&self) -> f64 {
        let bl = self.bottom_left();
        let tl = self.top_left();
        let br = self.bottom_right();
        let tr = self.top_right();
        let dx = (tl.x - bl.x) + (tr.x - br.x);
        let dy = (tl.y - bl.y) + (tr.y - br.y);
        dy.atan2(dx).to_degrees().rem_euclid(360.0)
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        Rect::bounding(&self.corners)
    }
}
