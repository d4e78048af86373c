use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Instant};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::structs::types::{SessionToken, UserId};

#[derive(Debug)]
enum Command {
    Create {
        user_id: UserId,
        res_tx: oneshot::Sender<SessionToken>,
    },
    Resolve {
        token: SessionToken,
        res_tx: oneshot::Sender<Option<UserId>>,
    },
    Remove {
        token: SessionToken,
        res_tx: oneshot::Sender<bool>,
    },
}

/// 登录会话，token到(用户id,创建时间)
pub struct SessionServer {
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    sessions: HashMap<SessionToken, (UserId, Instant)>,
    ttl: Duration,
    purge_interval: Duration,
}

impl SessionServer {
    pub fn new(ttl: Duration) -> (SessionServer, SessionServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            SessionServer {
                cmd_rx,
                sessions: HashMap::new(),
                ttl,
                purge_interval: Duration::from_secs(60),
            },
            SessionServerHandle { cmd_tx },
        )
    }

    fn create(&mut self, user_id: UserId) -> SessionToken {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), (user_id, Instant::now()));
        log::info!("用户{}创建了新的会话", user_id);
        token
    }

    fn resolve(&mut self, token: &str) -> Option<UserId> {
        let (user_id, created) = *self.sessions.get(token)?;
        if created.elapsed() >= self.ttl {
            self.sessions.remove(token);
            return None;
        }
        Some(user_id)
    }

    fn purge(&mut self) {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, (_, created)| created.elapsed() < ttl);
        let purged = before - self.sessions.len();
        if purged > 0 {
            log::info!("清除了{}个过期会话", purged);
        }
    }

    pub async fn run(mut self) {
        let mut interval = time::interval(self.purge_interval);
        loop {
            tokio::select! {
                // 处理命令
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Create { user_id, res_tx }) => {
                            let _ = res_tx.send(self.create(user_id));
                        }
                        Some(Command::Resolve { token, res_tx }) => {
                            let _ = res_tx.send(self.resolve(&token));
                        }
                        Some(Command::Remove { token, res_tx }) => {
                            let _ = res_tx.send(self.sessions.remove(&token).is_some());
                        }
                        None => break,
                    }
                }
                // 定时清除过期会话
                _ = interval.tick() => self.purge(),
            }
        }
        log::info!("会话服务已停止");
    }
}

#[derive(Debug, Clone)]
pub struct SessionServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SessionServerHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> AppResult<T> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx.send(command(res_tx)).map_err(|_| AppError::ConnectionClosed)?;
        res_rx.await.map_err(|_| AppError::ConnectionClosed)
    }

    /// 为登录成功的用户生成新的会话token
    pub async fn create(&self, user_id: UserId) -> AppResult<SessionToken> {
        self.request(|res_tx| Command::Create { user_id, res_tx }).await
    }

    /// 查询token对应的用户，过期或不存在时返回None
    pub async fn resolve(&self, token: SessionToken) -> AppResult<Option<UserId>> {
        self.request(|res_tx| Command::Resolve { token, res_tx }).await
    }

    pub async fn remove(&self, token: SessionToken) -> AppResult<bool> {
        self.request(|res_tx| Command::Remove { token, res_tx }).await
    }
}
