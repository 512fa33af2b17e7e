//! 认证请求的加载状态
//! 仅用于驱动界面上的加载指示器，不影响请求结果

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 进行中的认证请求计数
#[derive(Debug, Clone)]
pub struct LoadingTracker {
    paths: Arc<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
}

impl LoadingTracker {
    pub fn new(paths: Vec<String>) -> Self {
        Self {
            paths: Arc::new(paths),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 路径在列表中时计数加一，返回的守卫释放时减一
    pub fn track(&self, path: &str) -> Option<LoadingGuard> {
        let path = strip_query(path);
        if !self.paths.iter().any(|p| p == path) {
            return None;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("auth_requests_in_flight").set(now as f64);
        Some(LoadingGuard {
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight() > 0
    }
}

/// 加载计数守卫
#[derive(Debug)]
pub struct LoadingGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("auth_requests_in_flight").set(now as f64);
    }
}

pub(crate) fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}
