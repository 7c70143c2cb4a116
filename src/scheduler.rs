// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/scheduler.rs - 检测周期调度器
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::app::AppEvent;

/// 定时器线程检查停止标志的轮询间隔
const TIMER_POLL: Duration = Duration::from_millis(20);

/// 检测周期状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
  Idle,
  Running,
}

/// 检测调度器：按固定周期触发检测，保证最多一个在途周期。
///
/// 在途标志与定时器线程共享。定时器在发送触发前检查该标志，
/// 周期开始时再通过 compare-exchange 二次检查，
/// Running 期间到达的触发被静默丢弃，绝不排队。
pub struct DetectionScheduler {
  interval: Duration,
  in_flight: Arc<AtomicBool>,
  events: Sender<AppEvent>,
  timer: Option<TimerHandle>,
}

struct TimerHandle {
  stop: Arc<AtomicBool>,
  thread: thread::JoinHandle<()>,
}

impl DetectionScheduler {
  pub fn new(interval: Duration, events: Sender<AppEvent>) -> Self {
    Self {
      interval,
      in_flight: Arc::new(AtomicBool::new(false)),
      events,
      timer: None,
    }
  }

  /// 为当前摄像头会话启动定时器。
  /// 上一个定时器总是先停止并汇合，不可能有两个定时器同时运行。
  pub fn start(&mut self) {
    self.stop();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let in_flight = Arc::clone(&self.in_flight);
    let events = self.events.clone();
    let interval = self.interval;

    let thread = thread::spawn(move || {
      let mut next_tick = Instant::now() + interval;
      while !stop_flag.load(Ordering::SeqCst) {
        if Instant::now() < next_tick {
          thread::sleep(TIMER_POLL);
          continue;
        }
        next_tick = Instant::now() + interval;

        if in_flight.load(Ordering::SeqCst) {
          trace!("检测周期仍在进行，丢弃本次定时触发");
          continue;
        }
        if events.send(AppEvent::Tick).is_err() {
          break;
        }
      }
    });

    self.timer = Some(TimerHandle { stop, thread });
    debug!("检测定时器已启动，周期 {:?}", self.interval);
  }

  /// 停止定时器并汇合线程；没有定时器时是空操作
  pub fn stop(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.stop.store(true, Ordering::SeqCst);
      let _ = timer.thread.join();
      debug!("检测定时器已停止");
    }
  }

  /// 手动触发一次检测，与定时触发遵循同一守卫
  pub fn trigger(&self) {
    if self.in_flight.load(Ordering::SeqCst) {
      debug!("检测周期仍在进行，丢弃手动触发");
      return;
    }
    let _ = self.events.send(AppEvent::DetectNow);
  }

  /// 尝试进入 Running；已在 Running 时返回 false（触发被丢弃）
  pub fn try_begin(&self) -> bool {
    self
      .in_flight
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_ok()
  }

  /// 周期完成（无论成功失败），回到 Idle
  pub fn finish(&self) {
    self.in_flight.store(false, Ordering::SeqCst);
  }

  pub fn state(&self) -> CycleState {
    if self.in_flight.load(Ordering::SeqCst) {
      CycleState::Running
    } else {
      CycleState::Idle
    }
  }

  pub fn timer_running(&self) -> bool {
    self.timer.is_some()
  }
}

impl Drop for DetectionScheduler {
  fn drop(&mut self) {
    self.stop();
  }
}
