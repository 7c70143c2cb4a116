// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/capture.rs - 帧快照捕获与编码
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
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

/// 帧快照：编码后的静态图像及捕获时的原生分辨率。
/// 创建后不可变，由检测客户端消费一次。
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
  jpeg: Vec<u8>,
  width: u32,
  height: u32,
}

impl FrameSnapshot {
  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn jpeg_bytes(&self) -> &[u8] {
    &self.jpeg
  }

  /// 编码为 data URL，作为检测请求的图像载荷
  pub fn to_data_url(&self) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(&self.jpeg))
  }
}

/// 帧捕获器：将当前视频帧编码为 JPEG（有损压缩，便于传输）。
/// 编码发生在私有缓冲区上，不会修改输入帧。
pub struct FrameCapturer {
  quality: u8,
}

impl FrameCapturer {
  /// quality 取值 1-100
  pub fn new(quality: u8) -> Self {
    Self { quality: quality.clamp(1, 100) }
  }

  /// 捕获当前帧。帧尚无可读内容（0×0）时返回 None。
  pub fn capture(&self, frame: &RgbImage) -> Result<Option<FrameSnapshot>> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
      return Ok(None);
    }

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
    encoder.encode_image(frame).context("JPEG 编码失败")?;

    Ok(Some(FrameSnapshot { jpeg: buffer, width, height }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
  }

  #[test]
  fn capture_empty_frame_returns_none() {
    let capturer = FrameCapturer::new(90);
    let snapshot = capturer.capture(&RgbImage::new(0, 0)).unwrap();
    assert!(snapshot.is_none());
  }

  #[test]
  fn capture_records_native_dimensions() {
    let capturer = FrameCapturer::new(90);
    let snapshot = capturer.capture(&gradient_frame(64, 48)).unwrap().unwrap();
    assert_eq!(snapshot.width(), 64);
    assert_eq!(snapshot.height(), 48);
  }

  #[test]
  fn capture_produces_decodable_jpeg() {
    let capturer = FrameCapturer::new(80);
    let snapshot = capturer.capture(&gradient_frame(64, 48)).unwrap().unwrap();
    let decoded = image::load_from_memory(snapshot.jpeg_bytes()).unwrap();
    assert_eq!(decoded.width(), 64);
    assert_eq!(decoded.height(), 48);
  }

  #[test]
  fn capture_does_not_mutate_frame() {
    let capturer = FrameCapturer::new(80);
    let frame = gradient_frame(32, 32);
    let before = frame.clone();
    capturer.capture(&frame).unwrap();
    assert_eq!(frame, before);
  }

  #[test]
  fn data_url_round_trips() {
    let capturer = FrameCapturer::new(90);
    let snapshot = capturer.capture(&gradient_frame(16, 16)).unwrap().unwrap();
    let url = snapshot.to_data_url();
    assert!(url.starts_with("data:image/jpeg;base64,"));

    let encoded = url.trim_start_matches("data:image/jpeg;base64,");
    let bytes = BASE64.decode(encoded).unwrap();
    assert_eq!(bytes, snapshot.jpeg_bytes());
  }
}
