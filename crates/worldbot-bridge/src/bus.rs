//! Fan-out of bot activity to displays and the status panel.
//!
//! One [`tokio::sync::broadcast`] channel per [`Topic`]: a slow panel client
//! lags and skips events instead of stalling the bridge service.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Conversation`] | Bot replies ready for display |
//! | [`Topic::Interactions`] | Item-use notices from the world |
//! | [`Topic::Link`] | Bridge state transitions |

use tokio::sync::broadcast;
use worldbot_types::Event;

/// Events buffered per topic before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation,
    Interactions,
    Link,
}

/// Clones publish to and subscribe from the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    conversation: broadcast::Sender<Event>,
    interactions: broadcast::Sender<Event>,
    link: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` applies to each topic separately.
    pub fn new(capacity: usize) -> Self {
        let (conversation, _) = broadcast::channel(capacity);
        let (interactions, _) = broadcast::channel(capacity);
        let (link, _) = broadcast::channel(capacity);
        Self {
            conversation,
            interactions,
            link,
        }
    }

    /// Returns how many subscribers got `event`.  Zero is fine: the panel
    /// may simply not be open.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Conversation => &self.conversation,
            Topic::Interactions => &self.interactions,
            Topic::Link => &self.link,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of one topic, from [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// `Lagged(n)` means `n` events were skipped; receiving again resumes at
    /// the oldest event still buffered.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldbot_types::{EventPayload, LinkState};

    fn bot_message(text: &str) -> Event {
        Event::new(
            "worldbot-bridge::test",
            EventPayload::BotMessage {
                sender_id: None,
                text: text.to_string(),
            },
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Conversation, bot_message("x")), 0);
    }

    #[tokio::test]
    async fn every_display_sees_each_reply() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut console = bus.subscribe_to(Topic::Conversation);
        let mut panel = bus.subscribe_to(Topic::Conversation);

        let event = bot_message("hello");
        assert_eq!(bus.publish_to(Topic::Conversation, event.clone()), 2);

        assert_eq!(console.recv().await?.id, event.id);
        assert_eq!(panel.recv().await?.id, event.id);
        assert_eq!(console.topic(), Topic::Conversation);
        Ok(())
    }

    #[tokio::test]
    async fn link_watchers_only_see_link_changes() {
        let bus = EventBus::default();
        let mut link = bus.subscribe_to(Topic::Link);

        bus.publish_to(Topic::Conversation, bot_message("hi"));
        bus.publish_to(Topic::Interactions, bot_message("lamp"));
        assert!(link.try_recv().is_err());

        bus.publish_to(
            Topic::Link,
            Event::new("test", EventPayload::LinkChanged(LinkState::Degraded)),
        );
        let event = link.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::LinkChanged(LinkState::Degraded)));
    }

    #[tokio::test]
    async fn slow_panel_lags_then_resumes() {
        let bus = EventBus::new(4);
        let mut panel = bus.subscribe_to(Topic::Conversation);

        for i in 0..10 {
            bus.publish_to(Topic::Conversation, bot_message(&i.to_string()));
        }

        assert!(matches!(
            panel.recv().await,
            Err(broadcast::error::RecvError::Lagged(6))
        ));
        let next = panel.recv().await.unwrap();
        assert!(matches!(
            next.payload,
            EventPayload::BotMessage { ref text, .. } if text == "6"
        ));
    }
}
