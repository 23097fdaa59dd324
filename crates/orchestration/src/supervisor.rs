//! 监督器
//!
//! 所有长循环共享一个关停标志 + 广播信号；任务 panic 由恢复壳
//! 捕获并延迟重启；停机时限期 join，超时任务记日志后放弃

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// panic 后重启前的冷却
const RESTART_DELAY: Duration = Duration::from_secs(5);

pub struct Supervisor {
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx, shutting_down: Arc::new(AtomicBool::new(false)), handles: Vec::new() }
    }

    /// 共享关停标志（扫描器、确认轮询等用它提前退出）
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutting_down.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// 广播发送端句柄（任务重启时用它创建新的接收端）
    pub fn sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// 启动受监督任务：正常返回视为结束，panic 记日志后延迟重启
    pub fn spawn<F, Fut>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        let shutting_down = self.shutting_down.clone();

        let handle = tokio::spawn(async move {
            loop {
                let run = tokio::spawn(factory());
                match run.await {
                    Ok(()) => break,
                    Err(e) => {
                        if shutting_down.load(Ordering::Acquire) {
                            break;
                        }
                        error!("任务异常退出，将重启: name={}, error={}", task_name, e);
                        tokio::time::sleep(RESTART_DELAY).await;
                    }
                }
            }
        });

        self.handles.push((name.to_string(), handle));
        info!("任务已启动: {}", name);
    }

    /// 优雅停机：置位 + 广播，随后限期 join
    pub async fn shutdown(self, deadline: Duration) {
        info!("开始优雅关闭，总超时: {:?}", deadline);

        self.shutting_down.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());

        let joined = tokio::time::timeout(deadline, async {
            for (name, handle) in self.handles {
                match handle.await {
                    Ok(()) => info!("任务已停止: {}", name),
                    Err(e) => warn!("任务join失败: name={}, error={}", name, e),
                }
            }
        })
        .await;

        match joined {
            Ok(()) => info!("✅ 所有任务已停止"),
            Err(_) => warn!("⚠️  关闭超时，剩余任务被放弃"),
        }
    }

    /// 等待 SIGINT / SIGTERM
    pub async fn wait_for_shutdown_signal() -> &'static str {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl-c");
            "CTRL+C"
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_restarts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut supervisor = Supervisor::new();

        let counter = attempts.clone();
        supervisor.spawn("flaky", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    panic!("boom");
                }
                // 第三次正常结束
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_joins_tasks() {
        let mut supervisor = Supervisor::new();
        let flag = supervisor.shutdown_signal();
        let mut rx = supervisor.subscribe();

        let flag_in_task = flag.clone();
        supervisor.spawn("loop", move || {
            let flag = flag_in_task.clone();
            async move {
                loop {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        });

        supervisor.shutdown(Duration::from_secs(30)).await;
        assert!(flag.load(Ordering::Acquire));
        // 广播已发出
        assert!(rx.try_recv().is_ok());
    }
}
