//! NAVI 핵심 에러 타입.
//!
//! 어댑터 crate는 외부 에러를 `CoreError`로 변환해 반환한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 설정, 전제조건, 캡처, 입력 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음 (예: 저장된 특징점 파일)
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "KeyPoints", "Descriptors")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 초기화 전에 호출됨
    #[error("초기화되지 않음: {0}")]
    NotInitialized(String),

    /// 화면 캡처 실패
    #[error("캡처 에러: {0}")]
    Capture(String),

    /// 입력 주입 실패
    #[error("입력 에러: {0}")]
    Input(String),

    /// 취소 신호 수신
    #[error("작업 취소됨")]
    Cancelled,

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}
