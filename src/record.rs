// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/record.rs - 标注结果目录记录
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
use chrono::Utc;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 快照记录器：把每个检测周期的标注图像保存到目录
pub struct SnapshotRecorder {
  dir: PathBuf,
  index: u64,
}

impl SnapshotRecorder {
  pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("无法创建输出目录: {}", dir.display()))?;
    Ok(Self { dir, index: 0 })
  }

  /// 保存一帧标注图像，文件名带时间戳与序号
  pub fn save(&mut self, image: &RgbImage) -> Result<PathBuf> {
    let name = format!("detect_{}_{:04}.jpg", Utc::now().format("%Y%m%d_%H%M%S"), self.index);
    let path = self.dir.join(name);
    image.save(&path).with_context(|| format!("无法保存图像: {}", path.display()))?;
    self.index += 1;
    debug!("已记录标注图像: {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn save_writes_jpeg_files_with_increasing_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = SnapshotRecorder::new(dir.path().join("records")).unwrap();
    let image = RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]));

    let first = recorder.save(&image).unwrap();
    let second = recorder.save(&image).unwrap();

    assert!(first.exists());
    assert!(second.exists());
    assert_ne!(first, second);
    assert!(first.file_name().unwrap().to_str().unwrap().ends_with("_0000.jpg"));
    assert!(second.file_name().unwrap().to_str().unwrap().ends_with("_0001.jpg"));

    let decoded = image::open(&first).unwrap();
    assert_eq!(decoded.width(), 16);
  }
}
