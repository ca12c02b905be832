//! 경로점과 경로 작업.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::geometry::Point;

/// 경로점 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// 텔레포트 지점 (이동 단계 생략)
    Teleport,
    /// 중간 경로점
    #[default]
    Path,
    /// 최종 목표점 (정밀 접근 수행)
    Target,
}

/// 이동 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    #[default]
    Walk,
    Run,
    Fly,
    Jump,
    Swim,
}

/// 도착 시 수행할 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointAction {
    /// 비행 중지 (낙하 공격)
    StopFlying,
}

/// 경로점 한 개. 실행 중에는 변경되지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, rename = "type")]
    pub kind: WaypointKind,
    #[serde(default)]
    pub move_mode: MoveMode,
    #[serde(default)]
    pub action: Option<WaypointAction>,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, kind: WaypointKind, move_mode: MoveMode) -> Self {
        Self {
            x,
            y,
            kind,
            move_mode,
            action: None,
        }
    }

    pub fn with_action(mut self, action: WaypointAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// 정밀 접근 단계가 필요한지 (최종 목표점이거나 동작이 붙은 경우)
    pub fn needs_refine(&self) -> bool {
        self.kind == WaypointKind::Target || self.action.is_some()
    }
}

/// 경로 작업 파일 (JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathingTask {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

impl PathingTask {
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pathing_task_with_defaults() {
        let json = r#"{
            "name": "statue",
            "waypoints": [
                {"x": 10.5, "y": -3.0, "type": "teleport"},
                {"x": 12.0, "y": -1.0, "move_mode": "fly"},
                {"x": 15.0, "y": 2.0, "type": "target", "action": "stop_flying"}
            ]
        }"#;
        let task = PathingTask::from_json(json).unwrap();
        assert_eq!(task.name, "statue");
        assert_eq!(task.waypoints.len(), 3);
        assert_eq!(task.waypoints[0].kind, WaypointKind::Teleport);
        assert_eq!(task.waypoints[1].kind, WaypointKind::Path);
        assert_eq!(task.waypoints[1].move_mode, MoveMode::Fly);
        assert_eq!(task.waypoints[2].action, Some(WaypointAction::StopFlying));
    }

    #[test]
    fn refine_needed_for_target_or_action() {
        let path = Waypoint::new(0.0, 0.0, WaypointKind::Path, MoveMode::Walk);
        assert!(!path.needs_refine());
        assert!(path.with_action(WaypointAction::StopFlying).needs_refine());
        assert!(Waypoint::new(0.0, 0.0, WaypointKind::Target, MoveMode::Walk).needs_refine());
    }

    #[test]
    fn invalid_json_is_serialization_error() {
        let err = PathingTask::from_json("{not json").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
