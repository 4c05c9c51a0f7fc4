/// 通知总线
///
/// 每个项目一条有序、只追加的通知日志；订阅者各自持有读游标，
/// 慢订阅者落后时从日志补齐，不会阻塞发布

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use common::{Error, Result};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 通知记录，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// 项目内单调递增的序号，从 1 开始
    pub seq: u64,
    pub action: String,
    pub event: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 将实体序列化为通知负载
pub fn event<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

struct FeedState {
    next_seq: u64,
    log: VecDeque<Notification>,
    tx: broadcast::Sender<Notification>,
}

/// 单条通知流
struct Feed {
    project_id: Option<Uuid>,
    limit: usize,
    state: Mutex<FeedState>,
}

impl Feed {
    fn new(project_id: Option<Uuid>, limit: usize) -> Self {
        let (tx, _) = broadcast::channel(limit.max(16));
        Self {
            project_id,
            limit: limit.max(1),
            state: Mutex::new(FeedState {
                next_seq: 1,
                log: VecDeque::new(),
                tx,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, action: &str, event: serde_json::Value) -> Notification {
        let mut state = self.lock();
        let notification = Notification {
            seq: state.next_seq,
            action: action.to_string(),
            event,
            project_id: self.project_id,
            created_at: Utc::now(),
        };
        state.next_seq += 1;

        state.log.push_back(notification.clone());
        while state.log.len() > self.limit {
            state.log.pop_front();
        }

        // 没有订阅者时发送失败，忽略即可
        let _ = state.tx.send(notification.clone());
        notification
    }

    fn since(&self, since_seq: u64) -> Vec<Notification> {
        let state = self.lock();
        state
            .log
            .iter()
            .filter(|n| n.seq > since_seq)
            .cloned()
            .collect()
    }

    fn subscribe(self: &Arc<Self>, since_seq: Option<u64>) -> Subscription {
        let state = self.lock();
        let rx = state.tx.subscribe();
        let (cursor, backlog) = match since_seq {
            Some(since) => (
                since,
                state.log.iter().filter(|n| n.seq > since).cloned().collect(),
            ),
            None => (state.next_seq - 1, VecDeque::new()),
        };
        Subscription {
            feed: Arc::downgrade(self),
            cursor,
            backlog,
            rx,
        }
    }
}

/// 通知订阅
///
/// 关闭订阅即取消；项目关闭后在读完剩余通知时结束
pub struct Subscription {
    feed: Weak<Feed>,
    /// 已交付的最后一个序号
    cursor: u64,
    backlog: VecDeque<Notification>,
    rx: broadcast::Receiver<Notification>,
}

impl Subscription {
    /// 下一条通知；通知流关闭时返回 None
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            if let Some(notification) = self.backlog.pop_front() {
                if notification.seq > self.cursor {
                    self.cursor = notification.seq;
                    return Some(notification);
                }
                continue;
            }

            match self.rx.recv().await {
                Ok(notification) => {
                    if notification.seq <= self.cursor {
                        continue;
                    }
                    self.cursor = notification.seq;
                    return Some(notification);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("订阅者落后 {} 条通知，从日志补齐", skipped);
                    self.refill();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 从保留日志中按游标补齐
    fn refill(&mut self) {
        let Some(feed) = self.feed.upgrade() else {
            return;
        };
        let missed = feed.since(self.cursor);
        if let Some(first) = missed.first() {
            if first.seq > self.cursor + 1 {
                warn!(
                    "通知已被裁剪，订阅者丢失 {} 条: {} -> {}",
                    first.seq - self.cursor - 1,
                    self.cursor,
                    first.seq
                );
            }
        }
        self.backlog = missed.into();
    }

    /// 转换为异步流
    pub fn into_stream(self) -> impl Stream<Item = Notification> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|notification| (notification, sub))
        })
    }
}

struct BusInner {
    controller: Arc<Feed>,
    projects: RwLock<HashMap<Uuid, Arc<Feed>>>,
    limit: usize,
}

/// 通知总线
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    pub fn new(log_limit: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                controller: Arc::new(Feed::new(None, log_limit)),
                projects: RwLock::new(HashMap::new()),
                limit: log_limit,
            }),
        }
    }

    fn feed(&self, project_id: Uuid) -> Result<Arc<Feed>> {
        let projects = self
            .inner
            .projects
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("项目不存在: {}", project_id)))
    }

    /// 为新项目创建通知流
    pub fn open_project(&self, project_id: Uuid) {
        let mut projects = self
            .inner
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        projects
            .entry(project_id)
            .or_insert_with(|| Arc::new(Feed::new(Some(project_id), self.inner.limit)));
    }

    /// 移除项目通知流，现有订阅在读完后结束
    pub fn close_project(&self, project_id: Uuid) {
        let mut projects = self
            .inner
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if projects.remove(&project_id).is_some() {
            info!("项目通知流已关闭: {}", project_id);
        }
    }

    /// 发布项目通知；项目不存在时丢弃
    pub fn publish(
        &self,
        project_id: Uuid,
        action: &str,
        event: serde_json::Value,
    ) -> Option<Notification> {
        match self.feed(project_id) {
            Ok(feed) => {
                let notification = feed.publish(action, event);
                debug!(
                    "📣 项目通知: project={}, seq={}, action={}",
                    project_id, notification.seq, action
                );
                Some(notification)
            }
            Err(_) => {
                debug!("项目 {} 已不存在，丢弃通知 {}", project_id, action);
                None
            }
        }
    }

    /// 发布控制器级通知（Compute 事件）
    pub fn publish_controller(&self, action: &str, event: serde_json::Value) -> Notification {
        debug!("📣 控制器通知: action={}", action);
        self.inner.controller.publish(action, event)
    }

    /// 拉取 since_seq 之后的所有通知，不阻塞
    pub fn poll(&self, project_id: Uuid, since_seq: u64) -> Result<Vec<Notification>> {
        Ok(self.feed(project_id)?.since(since_seq))
    }

    /// 从当前时刻开始订阅
    pub fn subscribe(&self, project_id: Uuid) -> Result<Subscription> {
        Ok(self.feed(project_id)?.subscribe(None))
    }

    /// 先补发 since_seq 之后的历史通知，再接实时通知
    pub fn subscribe_from(&self, project_id: Uuid, since_seq: u64) -> Result<Subscription> {
        Ok(self.feed(project_id)?.subscribe(Some(since_seq)))
    }

    pub fn subscribe_controller(&self) -> Subscription {
        self.inner.controller.subscribe(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn bus_with_project(limit: usize) -> (NotificationBus, Uuid) {
        let bus = NotificationBus::new(limit);
        let project_id = Uuid::new_v4();
        bus.open_project(project_id);
        (bus, project_id)
    }

    #[test]
    fn test_poll_is_ordered_without_gaps() {
        let (bus, project_id) = bus_with_project(100);
        for i in 0..5 {
            bus.publish(project_id, "node.updated", json!({"i": i}));
        }

        let all = bus.poll(project_id, 0).unwrap();
        let seqs: Vec<u64> = all.iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

        let tail = bus.poll(project_id, 3).unwrap();
        assert_eq!(tail.iter().map(|n| n.seq).collect::<Vec<_>>(), vec![4, 5]);
        assert!(bus.poll(project_id, 5).unwrap().is_empty());
    }

    #[test]
    fn test_log_is_trimmed() {
        let (bus, project_id) = bus_with_project(3);
        for _ in 0..5 {
            bus.publish(project_id, "node.updated", json!({}));
        }
        let seqs: Vec<u64> = bus.poll(project_id, 0).unwrap().iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_unknown_project() {
        let bus = NotificationBus::new(10);
        let missing = Uuid::new_v4();
        assert!(matches!(bus.poll(missing, 0), Err(Error::NotFound(_))));
        assert!(bus.subscribe(missing).is_err());
        assert!(bus.publish(missing, "node.created", json!({})).is_none());
    }

    #[tokio::test]
    async fn test_subscribe_starts_from_now() {
        let (bus, project_id) = bus_with_project(100);
        bus.publish(project_id, "node.created", json!({}));

        let mut sub = bus.subscribe(project_id).unwrap();
        bus.publish(project_id, "node.updated", json!({}));

        let n = sub.next().await.unwrap();
        assert_eq!(n.seq, 2);
        assert_eq!(n.action, "node.updated");
        assert_eq!(n.project_id, Some(project_id));
    }

    #[tokio::test]
    async fn test_stream_matches_poll() {
        let (bus, project_id) = bus_with_project(100);
        bus.publish(project_id, "node.created", json!({}));
        let mark = 1;

        let sub = bus.subscribe(project_id).unwrap();
        for i in 0..4 {
            bus.publish(project_id, "node.updated", json!({"i": i}));
        }

        let streamed: Vec<Notification> = sub.into_stream().take(4).collect().await;
        let polled = bus.poll(project_id, mark).unwrap();
        assert_eq!(streamed, polled);
    }

    #[tokio::test]
    async fn test_subscribe_from_replays_backlog() {
        let (bus, project_id) = bus_with_project(100);
        for _ in 0..3 {
            bus.publish(project_id, "shape.created", json!({}));
        }

        let mut sub = bus.subscribe_from(project_id, 1).unwrap();
        bus.publish(project_id, "shape.deleted", json!({}));

        let mut seqs = Vec::new();
        for _ in 0..3 {
            seqs.push(sub.next().await.unwrap().seq);
        }
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_independent_cursors() {
        let (bus, project_id) = bus_with_project(100);
        let mut fast = bus.subscribe(project_id).unwrap();
        let mut slow = bus.subscribe(project_id).unwrap();

        bus.publish(project_id, "a", json!({}));
        bus.publish(project_id, "b", json!({}));

        assert_eq!(fast.next().await.unwrap().action, "a");
        assert_eq!(fast.next().await.unwrap().action, "b");
        assert_eq!(slow.next().await.unwrap().action, "a");
        assert_eq!(slow.next().await.unwrap().action, "b");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_recovers_from_log() {
        // 广播通道容量为 16，日志保留 64 条
        let (bus, project_id) = bus_with_project(64);
        let mut slow = bus.subscribe(project_id).unwrap();

        for i in 0..40 {
            bus.publish(project_id, "node.updated", json!({"i": i}));
        }

        let mut seqs = Vec::new();
        for _ in 0..40 {
            seqs.push(slow.next().await.unwrap().seq);
        }
        assert_eq!(seqs, (1..=40).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_subscription_ends_when_project_closes() {
        let (bus, project_id) = bus_with_project(10);
        let mut sub = bus.subscribe(project_id).unwrap();

        bus.publish(project_id, "project.closed", json!({}));
        bus.close_project(project_id);

        assert_eq!(sub.next().await.unwrap().action, "project.closed");
        let end = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn test_controller_feed() {
        let bus = NotificationBus::new(10);
        let first = bus.publish_controller("compute.updated", json!({"compute_id": "local"}));
        let second = bus.publish_controller("compute.updated", json!({"compute_id": "local"}));
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert!(first.project_id.is_none());
    }
}
