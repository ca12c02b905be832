//! 설정 파일 관리.
//!
//! 플랫폼 설정 디렉토리(또는 지정 경로)의 JSON 파일과
//! `NAVI_` 접두사 환경 변수를 겹쳐 `AppConfig`를 만든다.
//! 파일이 없으면 기본값을 사용한다.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::CoreError;

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.json";

/// 환경 변수 접두사 (예: `NAVI_DISPATCHER__INTERVAL_MS=100`)
const ENV_PREFIX: &str = "NAVI";

/// 설정 관리자
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// 플랫폼 기본 경로에서 설정 로드
    pub fn new() -> Result<Self, CoreError> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE_NAME);
        Self::with_path(config_path)
    }

    /// 지정된 경로에서 설정 로드
    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        let config = Self::load(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// 현재 설정 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 설정 다시 로드
    pub fn reload(&mut self) -> Result<(), CoreError> {
        self.config = Self::load(&self.config_path)?;
        info!("설정 다시 로드 완료");
        Ok(())
    }

    /// 플랫폼별 설정 디렉토리
    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|d| d.config_dir().to_path_buf())
    }

    /// 플랫폼별 데이터 디렉토리 (특징점, 스크린샷 등)
    pub fn data_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|d| d.data_dir().to_path_buf())
    }

    fn project_dirs() -> Result<ProjectDirs, CoreError> {
        ProjectDirs::from("dev", "navi", "navi")
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
    }

    fn load(path: &Path) -> Result<AppConfig, CoreError> {
        if path.exists() {
            debug!("설정 파일 로드: {}", path.display());
        } else {
            debug!("설정 파일 없음, 기본값 사용: {}", path.display());
        }

        let config: AppConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                CoreError::Config(format!("설정 파싱 실패: {}: {e}", path.display()))
            })?;

        config.validate()?;
        Ok(config)
    }
}
