// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use std::io::BufRead;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use liaowang::app::{AppConfig, AppController, AppEvent};
use liaowang::camera::V4l2Camera;
use liaowang::client::DetectionClient;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("检测服务端点: {}", args.endpoint);
  info!("后置摄像头: {}", args.rear_device);
  info!("前置摄像头: {}", args.front_device);
  info!("初始朝向: {}", args.mode.facing());
  info!("检测周期: {} 秒", args.interval);

  let device = V4l2Camera::new(args.rear_device, args.front_device);
  let detector = DetectionClient::new(args.endpoint);
  let config = AppConfig {
    mode: args.mode,
    interval: Duration::from_secs(args.interval),
    quality: args.quality,
    output_dir: args.output_dir,
    max_cycles: args.max_cycles,
  };

  let mut app = AppController::new(config, Box::new(device), Box::new(detector))?;

  let control = app.control();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = control.send(AppEvent::Shutdown);
  })?;

  // stdin 控制线程: s=切换摄像头, d=立即检测, q=退出
  let control = app.control();
  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let Ok(line) = line else { break };
      match line.trim() {
        "s" | "switch" => {
          let _ = control.send(AppEvent::SwitchCamera);
        }
        "d" | "detect" => {
          let _ = control.send(AppEvent::DetectNow);
        }
        "q" | "quit" => {
          let _ = control.send(AppEvent::Shutdown);
          break;
        }
        "" => {}
        other => warn!("未知命令: {}", other),
      }
    }
  });

  info!("开始检测循环 (s=切换摄像头, d=立即检测, q=退出)");
  app.start();
  app.run()?;

  info!("任务完成，退出");
  Ok(())
}
