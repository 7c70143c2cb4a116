// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/app.rs - 应用控制器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Liaowang Contributors

use anyhow::Result;
use image::RgbImage;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::camera::{CameraController, CameraDevice, CameraMode};
use crate::capture::FrameCapturer;
use crate::client::{Detection, Detector};
use crate::overlay::OverlayRenderer;
use crate::record::SnapshotRecorder;
use crate::scheduler::{CycleState, DetectionScheduler};

/// 应用事件。定时器、Ctrl-C 处理与 stdin 控制线程只发送事件，
/// 所有状态变更都发生在控制器自己的事件循环线程上。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
  /// 定时触发
  Tick,
  /// 手动触发（与定时触发遵循同一守卫）
  DetectNow,
  /// 切换前后摄像头
  SwitchCamera,
  /// 退出
  Shutdown,
}

/// 检测周期状态。lastDetections 只会被成功周期整体替换，
/// 失败周期只更新 lastError。在途标志位于调度器（与定时器线程共享）。
#[derive(Debug, Default)]
pub struct DetectionCycleState {
  pub last_error: Option<String>,
  pub last_detections: Vec<Detection>,
}

/// 按类别聚合的检测概要，每次调用都从最近的检测列表重新推导
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSummary {
  /// 类别 -> 数量
  pub counts: BTreeMap<String, usize>,
  /// 总数
  pub total: usize,
}

pub struct AppConfig {
  /// 初始摄像头朝向
  pub mode: CameraMode,
  /// 检测周期间隔
  pub interval: Duration,
  /// JPEG 编码质量 (1-100)
  pub quality: u8,
  /// 标注图像输出目录（None 则不保存）
  pub output_dir: Option<PathBuf>,
  /// 最大周期数（0 表示无限制）
  pub max_cycles: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      mode: CameraMode::Rear,
      interval: Duration::from_secs(10),
      quality: 90,
      output_dir: None,
      max_cycles: 0,
    }
  }
}

struct CycleOutcome {
  frame: RgbImage,
  detections: Vec<Detection>,
}

/// 应用控制器：串联摄像头、捕获、检测与叠加渲染
pub struct AppController {
  camera: CameraController,
  capturer: FrameCapturer,
  detector: Box<dyn Detector>,
  scheduler: DetectionScheduler,
  overlay: OverlayRenderer,
  recorder: Option<SnapshotRecorder>,
  state: DetectionCycleState,
  mode: CameraMode,
  /// 会话代数。模式切换或流重建后递增，
  /// 此前开始的周期产生的结果不再套用（存活检查）。
  session: u64,
  cycles: u64,
  max_cycles: u64,
  control: Sender<AppEvent>,
  events: Receiver<AppEvent>,
  pending: VecDeque<AppEvent>,
}

impl AppController {
  pub fn new(
    config: AppConfig,
    device: Box<dyn CameraDevice>,
    detector: Box<dyn Detector>,
  ) -> Result<Self> {
    let (control, events) = channel();
    let recorder = match &config.output_dir {
      Some(dir) => Some(SnapshotRecorder::new(dir)?),
      None => None,
    };

    Ok(Self {
      camera: CameraController::new(device),
      capturer: FrameCapturer::new(config.quality),
      detector,
      scheduler: DetectionScheduler::new(config.interval, control.clone()),
      overlay: OverlayRenderer::new(),
      recorder,
      state: DetectionCycleState::default(),
      mode: config.mode,
      session: 0,
      cycles: 0,
      max_cycles: config.max_cycles,
      control,
      events,
      pending: VecDeque::new(),
    })
  }

  /// 事件发送端，供 Ctrl-C 处理与控制线程使用
  pub fn control(&self) -> Sender<AppEvent> {
    self.control.clone()
  }

  /// 获取摄像头流并启动调度
  pub fn start(&mut self) {
    self.begin_session();
  }

  /// 切换前后摄像头：先停定时器、释放旧流，再获取新流并重启调度
  pub fn switch_camera(&mut self) {
    self.mode = self.mode.switched();
    info!("切换到{}摄像头", self.mode.facing());
    self.scheduler.stop();
    self.camera.release();
    self.begin_session();
  }

  fn begin_session(&mut self) {
    self.session += 1;
    match self.camera.acquire(self.mode) {
      Ok(()) => {
        match self.camera.resolution() {
          Some((width, height)) => {
            info!("摄像头已就绪 ({}): {}x{}", self.mode.facing(), width, height)
          }
          None => info!("摄像头已就绪 ({}): 分辨率待上报", self.mode.facing()),
        }
        self.scheduler.start();
      }
      Err(e) => {
        warn!("{}", e);
        self.state.last_error = Some(e.to_string());
      }
    }
  }

  /// 事件主循环，收到 Shutdown 或达到最大周期数后返回
  pub fn run(&mut self) -> Result<()> {
    loop {
      let event = match self.pending.pop_front() {
        Some(event) => event,
        None => match self.events.recv() {
          Ok(event) => event,
          Err(_) => break,
        },
      };
      if !self.handle_event(event) {
        break;
      }
    }
    self.shutdown();
    Ok(())
  }

  /// 处理单个事件；返回 false 表示应退出主循环
  pub fn handle_event(&mut self, event: AppEvent) -> bool {
    match event {
      AppEvent::Tick | AppEvent::DetectNow => {
        self.run_cycle();
        if self.max_cycles > 0 && self.cycles >= self.max_cycles {
          info!("已达到最大周期数: {}", self.max_cycles);
          return false;
        }
        true
      }
      AppEvent::SwitchCamera => {
        self.switch_camera();
        true
      }
      AppEvent::Shutdown => {
        info!("收到退出请求");
        false
      }
    }
  }

  /// 停止调度并释放摄像头
  pub fn shutdown(&mut self) {
    self.scheduler.stop();
    self.camera.release();
  }

  /// 执行一个完整的检测周期：捕获 -> 请求 -> 套用状态 -> 渲染
  fn run_cycle(&mut self) {
    if !self.scheduler.try_begin() {
      trace!("已有在途检测周期，忽略本次触发");
      return;
    }

    let session = self.session;
    let outcome = self.detect_once();
    self.apply_outcome(session, outcome);
    self.scheduler.finish();
    self.cycles += 1;
    self.drain_stale_triggers();
  }

  fn detect_once(&mut self) -> Result<Option<CycleOutcome>> {
    let frame = {
      let Some(stream) = self.camera.stream_mut() else {
        debug!("没有活动的摄像头流，跳过本次检测");
        return Ok(None);
      };
      match stream.read_frame()? {
        Some(frame) => frame,
        None => {
          debug!("尚无可读帧，跳过本次检测");
          return Ok(None);
        }
      }
    };

    let Some(snapshot) = self.capturer.capture(&frame)? else {
      debug!("当前帧尚不可读，跳过本次检测");
      return Ok(None);
    };

    let detections = self.detector.detect(&snapshot)?;
    Ok(Some(CycleOutcome { frame, detections }))
  }

  /// 套用周期结果。存活检查：会话已切换时丢弃过期结果。
  /// 成功周期整体替换检测列表并清除错误；
  /// 失败周期只记录错误，保留上一次成功的检测列表。
  fn apply_outcome(&mut self, session: u64, outcome: Result<Option<CycleOutcome>>) {
    if session != self.session {
      debug!("会话已切换，丢弃过期的检测结果");
      return;
    }

    match outcome {
      Ok(Some(outcome)) => {
        self.state.last_error = None;
        self.state.last_detections = outcome.detections;

        let summary = self.summary();
        info!("检测完成: 共 {} 个对象", summary.total);
        for (name, count) in &summary.counts {
          info!("  - {}: {}", name, count);
        }

        let display = (outcome.frame.width(), outcome.frame.height());
        let annotated = self.overlay.render(&outcome.frame, &self.state.last_detections, display);
        if let Some(recorder) = self.recorder.as_mut()
          && let Err(e) = recorder.save(&annotated)
        {
          warn!("保存标注图像失败: {:#}", e);
        }
      }
      Ok(None) => {}
      Err(e) => {
        warn!("检测周期失败: {:#}", e);
        self.state.last_error = Some(format!("{:#}", e));
      }
    }
  }

  /// 丢弃周期执行期间积压的触发事件（绝不排队补跑），
  /// 其余事件保序延后处理
  fn drain_stale_triggers(&mut self) {
    while let Ok(event) = self.events.try_recv() {
      match event {
        AppEvent::Tick | AppEvent::DetectNow => trace!("丢弃周期执行期间积压的触发"),
        other => self.pending.push_back(other),
      }
    }
  }

  /// 按类别聚合的概要，从最近的检测列表现场推导，不缓存
  pub fn summary(&self) -> DetectionSummary {
    let mut counts = BTreeMap::new();
    for detection in &self.state.last_detections {
      *counts.entry(detection.name.clone()).or_insert(0) += 1;
    }
    DetectionSummary { counts, total: self.state.last_detections.len() }
  }

  pub fn is_processing(&self) -> bool {
    self.scheduler.state() == CycleState::Running
  }

  pub fn last_error(&self) -> Option<&str> {
    self.state.last_error.as_deref()
  }

  pub fn last_detections(&self) -> &[Detection] {
    &self.state.last_detections
  }

  pub fn mode(&self) -> CameraMode {
    self.mode
  }

  pub fn has_active_stream(&self) -> bool {
    self.camera.has_stream()
  }
}
