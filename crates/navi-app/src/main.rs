//! # navi
//!
//! 캡처/디스패치 스케줄러, 미니맵 위치 추정, 경로점 추종 컨트롤러를 조립하는 진입점.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use navi_app::dispatcher::TaskTriggerDispatcher;
use navi_app::event_bus::EventBus;
use navi_app::lifecycle::LifecycleManager;
use navi_app::supervisor::{supervise, SupervisorExit};
use navi_app::task_runner::{TaskRunner, TimerOperation};
use navi_automation::action_input::KeyMappedInput;
use navi_automation::input_driver::create_platform_input_driver;
use navi_automation::noop::{NoOpMotionSensor, NoOpTeleporter};
use navi_automation::path_executor::{NavigationPorts, PathExecutor};
use navi_core::config::AppConfig;
use navi_core::config_manager::ConfigManager;
use navi_core::models::waypoint::PathingTask;
use navi_core::ports::capture::WindowMonitor;
use navi_core::ports::input::InputDriver;
use navi_vision::capture::{DesktopMonitor, ScreenFrameSource, XcapWindowMonitor};
use navi_vision::detector::FeatureDetector;
use navi_vision::feature_storage::FileFeatureStorage;
use navi_vision::index::FeatureIndex;
use navi_vision::localizer::{Localizer, LocalizerParams};
use navi_vision::minimap::MinimapLocator;
use navi_vision::trigger::PositionTrackTrigger;

/// 위치 추적 트리거 추정 간격
const TRACK_PERIOD: Duration = Duration::from_millis(500);

/// 미니맵 위치 추정 및 경로점 자동 이동
#[derive(Parser, Debug)]
#[command(name = "navi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    /// 캡처 대상 창 (제목 또는 앱 이름 일부). 없으면 주 모니터
    #[arg(long, short = 't', global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 디스패처를 띄우고 위치를 계속 추적
    Run,
    /// 경로 작업 파일(JSON) 실행
    Path {
        /// 경로 작업 파일
        file: PathBuf,
    },
    /// 특징 인덱스 관리
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    /// 참조 이미지에서 특징점을 검출해 저장
    Build {
        /// 참조 지도 이미지
        image: PathBuf,
        /// 저장 식별자 (기본: 설정의 feature_name)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "navi={lvl},navi_app={lvl},navi_core={lvl},navi_vision={lvl},navi_automation={lvl}",
        lvl = args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let config = load_config(args.config.clone())?;

    match args.command {
        Command::Run => run_tracking(config, args.target).await,
        Command::Path { file } => run_path(config, args.target, &file).await,
        Command::Index {
            action: IndexCommand::Build { image, name },
        } => build_index(&config, &image, name),
    }
}

/// 설정 로드 후 디렉토리 기본값 채우기
fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let manager = match path {
        Some(p) => ConfigManager::with_path(p)?,
        None => ConfigManager::new()?,
    };
    info!("설정 파일: {}", manager.config_path().display());

    let mut config = manager.get();
    config
        .validate()
        .map_err(|e| anyhow!("설정 검증 실패: {e}"))?;

    let data_dir = ConfigManager::data_dir()?;
    if config.dispatcher.screenshot_dir.is_none() {
        config.dispatcher.screenshot_dir = Some(data_dir.join("screenshots"));
    }
    if config.localizer.feature_dir.is_none() {
        config.localizer.feature_dir = Some(data_dir.join("features"));
    }
    Ok(config)
}

fn feature_storage(config: &AppConfig) -> Result<FileFeatureStorage> {
    let dir = config
        .localizer
        .feature_dir
        .clone()
        .ok_or_else(|| anyhow!("특징점 저장 디렉토리가 지정되지 않았습니다"))?;
    Ok(FileFeatureStorage::new(dir))
}

/// 참조 이미지와 저장된 특징점으로 로컬라이저 생성
fn build_localizer(config: &AppConfig) -> Result<Arc<Localizer>> {
    let reference = config
        .localizer
        .reference_image
        .as_ref()
        .ok_or_else(|| anyhow!("localizer.reference_image 설정이 필요합니다"))?;
    let map = image::open(reference)
        .with_context(|| format!("참조 이미지 로드 실패: {}", reference.display()))?
        .into_luma8();

    let storage = feature_storage(config)?;
    let detector = FeatureDetector::from_config(&config.localizer);
    let (rows, cols) = config.localizer.grid();
    let index = FeatureIndex::build_or_load(
        &storage,
        &config.localizer.feature_name,
        &map,
        &detector,
        rows,
        cols,
    )?;
    info!(keypoints = index.len(), rows, cols, "로컬라이저 준비 완료");

    Ok(Arc::new(Localizer::new(
        Arc::new(index),
        detector,
        LocalizerParams::from_config(&config.localizer),
    )))
}

fn build_dispatcher(
    config: &AppConfig,
    target: Option<String>,
    events: EventBus,
) -> Arc<TaskTriggerDispatcher> {
    let monitor: Arc<dyn WindowMonitor> = match &target {
        Some(t) => Arc::new(XcapWindowMonitor::new(t.clone())),
        None => Arc::new(DesktopMonitor),
    };
    TaskTriggerDispatcher::new(
        config.dispatcher.clone(),
        Arc::new(ScreenFrameSource::new(target)),
        monitor,
        events,
    )
}

fn log_supervisor_exit(exit: SupervisorExit) {
    match exit {
        SupervisorExit::Shutdown => info!("정상 종료"),
        SupervisorExit::TargetExited => warn!("대상 창이 닫혀 종료합니다"),
        SupervisorExit::CaptureLost => warn!("캡처를 사용할 수 없어 종료합니다"),
        SupervisorExit::BusClosed => warn!("이벤트 버스가 닫혀 종료합니다"),
    }
}

/// `run`: 위치 추적 트리거만 등록하고 종료 신호까지 실행
async fn run_tracking(config: AppConfig, target: Option<String>) -> Result<()> {
    let localizer = build_localizer(&config)?;
    let locator = Arc::new(MinimapLocator::new(localizer, config.minimap.rect));
    let tracker =
        Arc::new(PositionTrackTrigger::new(locator, TRACK_PERIOD).with_background(true));

    let events = EventBus::default();
    let dispatcher = build_dispatcher(&config, target, events.clone());
    dispatcher.add_trigger(tracker.clone());

    let lifecycle = Arc::new(LifecycleManager::new());
    let mut supervisor = tokio::spawn(supervise(
        Arc::clone(&dispatcher),
        events.subscribe(),
        lifecycle.subscribe(),
    ));

    dispatcher.start()?;
    info!("디스패처 시작: {}ms 주기", config.dispatcher.interval_ms);

    let mut positions = tracker.subscribe();
    let signal = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move { lifecycle.wait_for_signal().await })
    };

    let exit = loop {
        tokio::select! {
            exit = &mut supervisor => break exit?,
            Ok(()) = positions.changed() => {
                if let Some(p) = *positions.borrow_and_update() {
                    info!("현재 위치: ({:.1}, {:.1})", p.x, p.y);
                }
            }
        }
    };

    signal.abort();
    log_supervisor_exit(exit);
    Ok(())
}

/// `path`: 경로 작업 실행. 디스패처는 캐시 전용 모드로 프레임만 공급
async fn run_path(config: AppConfig, target: Option<String>, file: &Path) -> Result<()> {
    let task = PathingTask::from_file(file)
        .with_context(|| format!("경로 작업 로드 실패: {}", file.display()))?;
    info!(
        name = %task.name,
        waypoints = task.waypoints.len(),
        "경로 작업 로드"
    );

    let localizer = build_localizer(&config)?;
    let locator = Arc::new(MinimapLocator::new(localizer, config.minimap.rect));

    let events = EventBus::default();
    let dispatcher = build_dispatcher(&config, target, events.clone());

    let lifecycle = Arc::new(LifecycleManager::new());
    let supervisor = tokio::spawn(supervise(
        Arc::clone(&dispatcher),
        events.subscribe(),
        lifecycle.subscribe(),
    ));
    dispatcher.start()?;

    let driver: Arc<dyn InputDriver> = Arc::from(create_platform_input_driver());
    info!(platform = driver.platform(), "입력 드라이버 준비");
    let input = KeyMappedInput::new(driver, config.key_bindings.clone());
    input.validate().context("키 바인딩 설정 오류")?;
    let ports = NavigationPorts {
        frames: dispatcher.clone(),
        position: locator.clone(),
        heading: locator,
        motion: Arc::new(NoOpMotionSensor),
        input: Arc::new(input),
        teleporter: Arc::new(NoOpTeleporter),
    };
    let executor = PathExecutor::new(ports, config.navigation.clone(), config.map_transform)
        .with_cancellation(lifecycle.cancellation());

    let signal = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move { lifecycle.wait_for_signal().await })
    };

    let runner = TaskRunner::new(Arc::clone(&dispatcher), TimerOperation::UseCacheImage);
    let result = runner
        .run(&task.name, || executor.run(&task.waypoints))
        .await;

    lifecycle.shutdown();
    signal.abort();
    let exit = supervisor.await?;
    log_supervisor_exit(exit);

    let report = result?;
    for (i, outcome) in report.outcomes.iter().enumerate() {
        info!("경로점 {i}: {outcome:?}");
    }
    info!(
        "경로 완료: {}/{} 도달",
        report.reached(),
        task.waypoints.len()
    );
    Ok(())
}

/// `index build`: 참조 이미지에서 특징 인덱스 생성 후 저장
fn build_index(config: &AppConfig, image_path: &Path, name: Option<String>) -> Result<()> {
    let map = image::open(image_path)
        .with_context(|| format!("참조 이미지 로드 실패: {}", image_path.display()))?
        .into_luma8();
    let detector = FeatureDetector::from_config(&config.localizer);
    let (rows, cols) = config.localizer.grid();
    let index = FeatureIndex::build(&map, &detector, rows, cols)?;

    let name = name.unwrap_or_else(|| config.localizer.feature_name.clone());
    let storage = feature_storage(config)?;
    index.save(&storage, &name)?;
    info!(
        name = %name,
        kind = %index.kind(),
        keypoints = index.len(),
        dir = %storage.dir().display(),
        "특징 인덱스 저장 완료"
    );
    Ok(())
}
