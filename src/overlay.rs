// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/overlay.rs - 检测结果叠加层渲染
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::client::Detection;

// 标签渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_HEIGHT: u32 = 20;
const LABEL_PADDING: u32 = 5;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色边框
const LABEL_BACKGROUND: [u8; 3] = [32, 32, 32]; // 不透明深色背景
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色文本

/// 叠加层渲染器：把检测框与标签绘制到显示表面。
///
/// 渲染只依赖最近一次完成周期的检测列表，
/// 每次都从干净的底图开始，上一周期的框不会残留。
pub struct OverlayRenderer {
  font: FontArc,
  font_scale: PxScale,
  box_color: Rgb<u8>,
}

impl Default for OverlayRenderer {
  fn default() -> Self {
    Self::new()
  }
}

impl OverlayRenderer {
  pub fn new() -> Self {
    let font_data = include_bytes!("../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      box_color: Rgb(BOX_COLOR),
    }
  }

  /// 渲染一帧检测结果，返回显示分辨率下的标注图像。
  /// 默认配置下显示分辨率等于原生分辨率（1:1 映射）。
  pub fn render(&self, frame: &RgbImage, detections: &[Detection], display: (u32, u32)) -> RgbImage {
    let native = (frame.width(), frame.height());
    let mut canvas = if display == native {
      frame.clone()
    } else {
      imageops::resize(frame, display.0, display.1, imageops::FilterType::Triangle)
    };

    for detection in detections {
      self.draw_detection(&mut canvas, detection, native, display);
    }

    canvas
  }

  /// 把原生像素坐标下的边界框映射到显示坐标，
  /// X/Y 方向使用各自独立的缩放因子
  fn scale_bbox(bbox: &[f32; 4], native: (u32, u32), display: (u32, u32)) -> (i32, i32, u32, u32) {
    let scale_x = display.0 as f32 / native.0.max(1) as f32;
    let scale_y = display.1 as f32 / native.1.max(1) as f32;

    let x = (bbox[0] * scale_x).round() as i32;
    let y = (bbox[1] * scale_y).round() as i32;
    let width = ((bbox[2] - bbox[0]) * scale_x).round().max(0.0) as u32;
    let height = ((bbox[3] - bbox[1]) * scale_y).round().max(0.0) as u32;

    (x, y, width, height)
  }

  fn draw_detection(
    &self,
    canvas: &mut RgbImage,
    detection: &Detection,
    native: (u32, u32),
    display: (u32, u32),
  ) {
    let (x, y, width, height) = Self::scale_bbox(&detection.bbox, native, display);
    if width == 0 || height == 0 {
      return;
    }

    // 绘制边界框
    draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(width, height), self.box_color);

    // 绘制第二个边框以增加可见度
    if width > 2 && height > 2 {
      let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(canvas, inner, self.box_color);
    }

    // 标签: "<类别> <置信度百分比>%"
    let label = format!("{} {}%", detection.name, (detection.confidence * 100.0).round() as i32);
    let (text_width, _text_height) = text_size(self.font_scale, &self.font, &label);

    // 标签背景位于边框正上方，按测量的文本宽度加固定内边距
    let label_width = text_width + 2 * LABEL_PADDING;
    let label_x = x;
    let label_y = (y - LABEL_HEIGHT as i32).max(0);

    draw_filled_rect_mut(
      canvas,
      Rect::at(label_x, label_y).of_size(label_width, LABEL_HEIGHT),
      Rgb(LABEL_BACKGROUND),
    );
    draw_text_mut(
      canvas,
      Rgb(LABEL_TEXT_COLOR),
      label_x + LABEL_PADDING as i32,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}
