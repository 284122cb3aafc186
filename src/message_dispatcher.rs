use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;

/// Callback for whole, reassembled messages, in the order the remote sender sent them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageDispatcher: Send + Sync + 'static {
    async fn on_message(&self, sender_addr: SocketAddr, msg_buf: &[u8]);
}
