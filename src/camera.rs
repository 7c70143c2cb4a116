// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/camera.rs - 摄像头流生命周期管理
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

use anyhow::{Context, Result};
use image::RgbImage;
use std::pin::Pin;
use thiserror::Error;
use tracing::debug;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// 摄像头朝向模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CameraMode {
  /// 后置摄像头（environment）
  Rear,
  /// 前置摄像头（user）
  Front,
}

impl CameraMode {
  /// 平台朝向偏好字符串
  pub fn facing(&self) -> &'static str {
    match self {
      CameraMode::Rear => "environment",
      CameraMode::Front => "user",
    }
  }

  /// 切换到另一个朝向
  pub fn switched(self) -> Self {
    match self {
      CameraMode::Rear => CameraMode::Front,
      CameraMode::Front => CameraMode::Rear,
    }
  }
}

impl std::fmt::Display for CameraMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.facing())
  }
}

#[derive(Error, Debug)]
pub enum CameraError {
  /// 权限被拒绝或设备不存在，附带平台错误原文
  #[error("摄像头访问错误: {0}")]
  Access(String),
}

/// 摄像头流：平台捕获能力的抽象
pub trait CameraStream {
  /// 当前原生分辨率；流尚未上报尺寸时为 None（过渡状态，不是错误）
  fn resolution(&self) -> Option<(u32, u32)>;

  /// 读取当前帧；尚无可读帧时返回 None
  fn read_frame(&mut self) -> Result<Option<RgbImage>>;

  /// 停止所有轨道；重复调用是空操作
  fn stop(&mut self);
}

/// 摄像头设备：按朝向模式打开一个流
pub trait CameraDevice {
  fn open(&mut self, mode: CameraMode) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// 活动流的独占句柄
pub struct StreamHandle {
  stream: Box<dyn CameraStream>,
  stopped: bool,
}

impl StreamHandle {
  fn new(stream: Box<dyn CameraStream>) -> Self {
    Self { stream, stopped: false }
  }

  pub fn resolution(&self) -> Option<(u32, u32)> {
    self.stream.resolution()
  }

  pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
    self.stream.read_frame()
  }

  fn stop(&mut self) {
    if !self.stopped {
      self.stream.stop();
      self.stopped = true;
    }
  }
}

impl Drop for StreamHandle {
  fn drop(&mut self) {
    self.stop();
  }
}

/// 摄像头控制器：同一时刻最多持有一个活动流
pub struct CameraController {
  device: Box<dyn CameraDevice>,
  active: Option<StreamHandle>,
}

impl CameraController {
  pub fn new(device: Box<dyn CameraDevice>) -> Self {
    Self { device, active: None }
  }

  /// 获取指定朝向的流。旧流总是先释放，避免残留。
  /// 这是唯一会触发平台权限请求的操作。
  pub fn acquire(&mut self, mode: CameraMode) -> Result<(), CameraError> {
    self.release();
    let stream = self.device.open(mode)?;
    self.active = Some(StreamHandle::new(stream));
    Ok(())
  }

  /// 释放当前流；没有活动流时是空操作
  pub fn release(&mut self) {
    if let Some(mut handle) = self.active.take() {
      handle.stop();
      debug!("摄像头流已释放");
    }
  }

  /// 当前原生分辨率（没有活动流或流未就绪时为 None）
  pub fn resolution(&self) -> Option<(u32, u32)> {
    self.active.as_ref().and_then(|handle| handle.resolution())
  }

  pub fn stream_mut(&mut self) -> Option<&mut StreamHandle> {
    self.active.as_mut()
  }

  pub fn has_stream(&self) -> bool {
    self.active.is_some()
  }
}

/// V4L2 摄像头设备。Linux 上没有朝向元数据，
/// 前后摄像头映射到两个设备路径。
pub struct V4l2Camera {
  rear_path: String,
  front_path: String,
}

impl V4l2Camera {
  pub fn new(rear_path: impl Into<String>, front_path: impl Into<String>) -> Self {
    Self {
      rear_path: rear_path.into(),
      front_path: front_path.into(),
    }
  }
}

impl CameraDevice for V4l2Camera {
  fn open(&mut self, mode: CameraMode) -> Result<Box<dyn CameraStream>, CameraError> {
    let path = match mode {
      CameraMode::Rear => &self.rear_path,
      CameraMode::Front => &self.front_path,
    };
    let stream = V4l2Stream::new(path).map_err(|e| CameraError::Access(format!("{:#}", e)))?;
    Ok(Box::new(stream))
  }
}

/// V4L2 捕获流
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box<Device>> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Stream {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
}

impl V4l2Stream {
  fn new(device_path: &str) -> Result<Self> {
    let device = Box::pin(
      Device::with_path(device_path).with_context(|| format!("无法打开设备: {}", device_path))?,
    );

    // 设置视频格式
    let mut format = device.format()?;
    format.width = 640;
    format.height = 480;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;

    let width = format.width;
    let height = format.height;

    let mut source = Self {
      device,
      stream: None,
      width,
      height,
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动，所以引用始终有效
    // 1. device 被 Pin<Box> 固定在堆上，不会移动
    // 2. stream 存储在同一个结构体中，会在 device 之前被 drop
    // 3. Drop 顺序：stream (Option::take) -> device
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, 4).context("无法创建捕获流")?
    };

    source.stream = Some(stream);
    Ok(source)
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks(4) {
      if chunk.len() < 4 {
        break;
      }

      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      // 第一个像素
      let r = (y0 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y0 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y0 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);

      // 第二个像素
      let r = (y1 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y1 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y1 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }

    rgb
  }
}

impl Drop for V4l2Stream {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl CameraStream for V4l2Stream {
  fn resolution(&self) -> Option<(u32, u32)> {
    Some((self.width, self.height))
  }

  fn read_frame(&mut self) -> Result<Option<RgbImage>> {
    let Some(stream) = self.stream.as_mut() else {
      return Ok(None);
    };

    let (buffer, _meta) = stream.next().context("无法捕获帧")?;
    let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);

    match RgbImage::from_raw(self.width, self.height, rgb_data) {
      Some(image) => Ok(Some(image)),
      None => Err(anyhow::anyhow!("无法创建 RGB 图像")),
    }
  }

  fn stop(&mut self) {
    self.stream.take();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FakeStream {
    frame: Option<RgbImage>,
    stops: Arc<AtomicUsize>,
  }

  impl CameraStream for FakeStream {
    fn resolution(&self) -> Option<(u32, u32)> {
      self.frame.as_ref().map(|f| (f.width(), f.height()))
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
      Ok(self.frame.clone())
    }

    fn stop(&mut self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn controller_with(frame: Option<RgbImage>) -> (CameraController, Arc<std::sync::Mutex<Vec<Arc<AtomicUsize>>>>) {
    // 通过共享 Vec 观察每个流的 stop 次数
    struct SharedDevice {
      frame: Option<RgbImage>,
      stops: Arc<std::sync::Mutex<Vec<Arc<AtomicUsize>>>>,
    }

    impl CameraDevice for SharedDevice {
      fn open(&mut self, _mode: CameraMode) -> Result<Box<dyn CameraStream>, CameraError> {
        let stops = Arc::new(AtomicUsize::new(0));
        self.stops.lock().unwrap().push(Arc::clone(&stops));
        Ok(Box::new(FakeStream { frame: self.frame.clone(), stops }))
      }
    }

    let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
    let device = SharedDevice { frame, stops: Arc::clone(&stops) };
    (CameraController::new(Box::new(device)), stops)
  }

  #[test]
  fn release_is_idempotent() {
    let (mut controller, stops) = controller_with(None);
    controller.acquire(CameraMode::Rear).unwrap();
    controller.release();
    controller.release();
    controller.release();
    let stops = stops.lock().unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].load(Ordering::SeqCst), 1);
  }

  #[test]
  fn release_without_stream_is_noop() {
    let (mut controller, _stops) = controller_with(None);
    controller.release();
    assert!(!controller.has_stream());
  }

  #[test]
  fn reacquire_stops_old_stream_exactly_once() {
    let (mut controller, stops) = controller_with(None);
    controller.acquire(CameraMode::Rear).unwrap();
    controller.acquire(CameraMode::Front).unwrap();
    let stops = stops.lock().unwrap();
    assert_eq!(stops.len(), 2);
    assert_eq!(stops[0].load(Ordering::SeqCst), 1);
    assert_eq!(stops[1].load(Ordering::SeqCst), 0);
    assert!(controller.has_stream());
  }

  #[test]
  fn resolution_unavailable_before_stream_reports() {
    let (mut controller, _stops) = controller_with(None);
    assert_eq!(controller.resolution(), None);
    controller.acquire(CameraMode::Rear).unwrap();
    assert_eq!(controller.resolution(), None);
  }

  #[test]
  fn resolution_reports_native_dimensions() {
    let (mut controller, _stops) = controller_with(Some(RgbImage::new(64, 48)));
    controller.acquire(CameraMode::Rear).unwrap();
    assert_eq!(controller.resolution(), Some((64, 48)));
  }

  #[test]
  fn dropping_handle_stops_stream() {
    let stops = Arc::new(AtomicUsize::new(0));
    {
      let _handle = StreamHandle::new(Box::new(FakeStream {
        frame: None,
        stops: Arc::clone(&stops),
      }));
    }
    assert_eq!(stops.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn mode_switch_round_trips() {
    assert_eq!(CameraMode::Rear.switched(), CameraMode::Front);
    assert_eq!(CameraMode::Front.switched(), CameraMode::Rear);
    assert_eq!(CameraMode::Rear.facing(), "environment");
    assert_eq!(CameraMode::Front.facing(), "user");
  }
}
