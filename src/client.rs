// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/client.rs - 远程检测服务客户端
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

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::capture::FrameSnapshot;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 单个检测结果。坐标为原生视频像素坐标，
/// 坐标映射由叠加层渲染器负责，这一层不做任何变换。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
  /// 边界框 [x1, y1, x2, y2]
  pub bbox: [f32; 4],
  /// 类别名称
  pub name: String,
  /// 置信度 (0.0 - 1.0)
  pub confidence: f32,
}

#[derive(Error, Debug)]
pub enum DetectError {
  /// 传输失败、非 2xx 状态或响应体无法解析
  #[error("网络错误: {0}")]
  Network(String),
  /// 服务端执行了请求但报告失败（success 为 false）
  #[error("服务错误: {0}")]
  Service(String),
}

/// 检测器抽象：输入一帧快照，输出按服务返回顺序排列的检测序列
pub trait Detector {
  fn detect(&self, snapshot: &FrameSnapshot) -> Result<Vec<Detection>, DetectError>;
}

#[derive(Serialize)]
struct DetectRequest {
  image: String,
}

#[derive(Deserialize)]
struct DetectResponse {
  success: bool,
  #[serde(default)]
  detections: Vec<Detection>,
  #[serde(default)]
  error: Option<String>,
}

/// 远程检测客户端：POST 编码帧到检测端点并解析 JSON 响应
pub struct DetectionClient {
  endpoint: Url,
  agent: ureq::Agent,
}

impl DetectionClient {
  pub fn new(endpoint: Url) -> Self {
    let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
    Self { endpoint, agent }
  }

  fn parse_response(body: &str) -> Result<Vec<Detection>, DetectError> {
    let response: DetectResponse = serde_json::from_str(body)
      .map_err(|e| DetectError::Network(format!("响应解析失败: {}", e)))?;

    if response.success {
      Ok(response.detections)
    } else {
      Err(DetectError::Service(
        response.error.unwrap_or_else(|| "未知错误".to_string()),
      ))
    }
  }
}

impl Detector for DetectionClient {
  fn detect(&self, snapshot: &FrameSnapshot) -> Result<Vec<Detection>, DetectError> {
    let request = DetectRequest { image: snapshot.to_data_url() };
    let body = serde_json::to_string(&request)
      .map_err(|e| DetectError::Network(format!("请求序列化失败: {}", e)))?;

    debug!("发送检测请求: {} 字节", body.len());

    let response = self
      .agent
      .post(self.endpoint.as_str())
      .set("Content-Type", "application/json")
      .send_string(&body)
      .map_err(|e| DetectError::Network(e.to_string()))?;

    let text = response
      .into_string()
      .map_err(|e| DetectError::Network(format!("读取响应失败: {}", e)))?;

    Self::parse_response(&text)
  }
}
