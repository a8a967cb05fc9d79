//! 会话事件总线
//!
//! One bus per [`CartEngine`](crate::CartEngine). Components publish typed
//! [`CartEvent`]s; the presentation layer subscribes.
//!
//! ```text
//! CartStore ─┐
//! Debouncer ─┼──▶ publish() ──▶ broadcast::Sender<CartEvent> ──▶ subscribers
//! Checkout  ─┘
//! ```

use shared::message::{CartEvent, Notice};
use tokio::sync::broadcast;

use crate::config::DEFAULT_EVENT_CAPACITY;

/// 事件总线 - 进程内发布/订阅
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CartEvent>,
}

impl EventBus {
    /// 创建默认容量的事件总线
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// 创建指定容量的事件总线
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 发布事件
    ///
    /// 没有订阅者时事件被丢弃，不视为错误
    pub fn publish(&self, event: CartEvent) {
        tracing::trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, notice: Notice) {
        self.publish(CartEvent::Notice(notice));
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Announce a new avatar to every component of the session
    pub fn avatar_updated(&self, avatar_url: impl Into<String>) {
        self.publish(CartEvent::AvatarUpdated {
            avatar_url: avatar_url.into(),
        });
    }

    /// Ask the chat widget to open a conversation with a shop
    pub fn chat_requested(&self, shop_owner_id: impl Into<String>, product_id: Option<String>) {
        self.publish(CartEvent::ChatRequested {
            shop_owner_id: shop_owner_id.into(),
            product_id,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorCode;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.avatar_updated("https://cdn.test/a.png");
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::with_capacity(8);
        let mut rx = bus.subscribe();

        bus.chat_requested("shop-1", Some("P1".into()));
        bus.notify(Notice::error(ErrorCode::CartEmpty, "empty"));

        assert_eq!(
            rx.recv().await.unwrap(),
            CartEvent::ChatRequested {
                shop_owner_id: "shop-1".into(),
                product_id: Some("P1".into()),
            }
        );
        match rx.recv().await.unwrap() {
            CartEvent::Notice(n) => assert_eq!(n.code, Some(ErrorCode::CartEmpty)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
