//! 调度器后台监控循环
//!
//! 循环只持有调度服务的弱引用，服务释放或收到关闭信号后退出。

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::scheduler::SchedulerService;

/// 周期性检测运行时间超过自身超时的任务
pub async fn stuck_task_monitor(
    service: Weak<SchedulerService>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(interval_secs = period.as_secs(), "启动卡住任务检测循环");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即完成，跳过
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(service) = service.upgrade() else {
                    break;
                };
                let stuck = service.detect_stuck_tasks().await;
                debug!(stuck = stuck.len(), "卡住任务检测完成");
            }
            _ = shutdown_rx.recv() => {
                info!("卡住任务检测循环收到关闭信号");
                break;
            }
        }
    }
}

/// 周期性清理过期的执行历史
pub async fn history_maintenance(
    service: Weak<SchedulerService>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(interval_secs = period.as_secs(), "启动历史清理循环");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.trim_history().await;
            }
            _ = shutdown_rx.recv() => {
                info!("历史清理循环收到关闭信号");
                break;
            }
        }
    }
}
