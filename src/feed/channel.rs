use super::{ChainFeed, FeedEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Feed backed by an in-process channel. Ends when every sender is dropped.
pub struct ChannelFeed {
    rx: mpsc::Receiver<FeedEvent>,
}

pub fn channel(capacity: usize) -> (mpsc::Sender<FeedEvent>, ChannelFeed) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelFeed { rx })
}

#[async_trait]
impl ChainFeed for ChannelFeed {
    async fn next_event(&mut self) -> anyhow::Result<Option<FeedEvent>> {
        Ok(self.rx.recv().await)
    }
}
