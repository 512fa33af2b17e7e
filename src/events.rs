//! 会话事件
//! 通过广播通道通知应用层（例如刷新失败后跳转登录页）

use tokio::sync::broadcast;

/// 会话事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 登录、注册或 OAuth 回调成功
    LoggedIn,
    /// 刷新令牌交换成功
    Refreshed,
    /// 刷新失败，凭证已清除，应用必须要求用户重新登录
    Expired { reason: String },
    /// 用户主动登出
    LoggedOut,
}

/// 会话事件总线
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// 发布事件；没有订阅者时静默丢弃
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(16)
    }
}
