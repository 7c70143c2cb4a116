// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use std::path::PathBuf;
use url::Url;

use liaowang::camera::CameraMode;

/// Liaowang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测服务端点
  #[arg(long, default_value = "http://127.0.0.1:3000/api/detect", value_name = "URL")]
  pub endpoint: Url,

  /// 后置摄像头（environment）的 V4L2 设备路径
  #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
  pub rear_device: String,

  /// 前置摄像头（user）的 V4L2 设备路径
  #[arg(long, default_value = "/dev/video1", value_name = "DEVICE")]
  pub front_device: String,

  /// 初始摄像头朝向
  #[arg(long, value_enum, default_value_t = CameraMode::Rear)]
  pub mode: CameraMode,

  /// 检测周期间隔（秒）
  #[arg(long, default_value_t = 10, value_name = "SECONDS")]
  pub interval: u64,

  /// JPEG 编码质量 (1-100)
  #[arg(long, default_value_t = 90, value_name = "QUALITY")]
  pub quality: u8,

  /// 标注图像输出目录（不设置则不保存）
  #[arg(long, value_name = "DIR")]
  pub output_dir: Option<PathBuf>,

  /// 最大检测周期数（0 表示无限制）
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_cycles: u64,
}
