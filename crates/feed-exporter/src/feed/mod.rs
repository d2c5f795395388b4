//! Change feed.
//!
//! A subscription yields notifications in the order the store emits them.
//! A stream error or the end of the stream is terminal for that
//! subscription; the feed supervisor decides whether to subscribe again.

pub mod postgres;

pub use postgres::PgChangeFeed;

use crate::errors::FeedError;
use crate::models::ChangeNotification;
use futures::stream::BoxStream;

/// Stream of notifications for one subscription.
pub type NotificationStream = BoxStream<'static, Result<ChangeNotification, FeedError>>;

/// Source of change notifications (enables mocking).
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a new subscription.
    async fn subscribe(&self) -> Result<NotificationStream, FeedError>;
}

/// Scripted change feed for testing.
pub mod mock {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    enum Scripted {
        Fail(FeedError),
        Stream {
            items: Vec<Result<ChangeNotification, FeedError>>,
            hold_open: bool,
        },
    }

    /// Feed that plays back one scripted step per `subscribe` call.
    ///
    /// Once the script is exhausted every further subscription stays open
    /// without yielding anything.
    #[derive(Default)]
    pub struct ScriptedChangeFeed {
        script: Mutex<VecDeque<Scripted>>,
        subscribe_count: AtomicUsize,
    }

    impl ScriptedChangeFeed {
        pub fn new() -> Self {
            Self::default()
        }

        /// Next subscription attempt fails.
        pub fn then_fail(self, error: FeedError) -> Self {
            self.push(Scripted::Fail(error))
        }

        /// Next subscription yields `items`, then ends.
        pub fn then_stream(self, items: Vec<Result<ChangeNotification, FeedError>>) -> Self {
            self.push(Scripted::Stream {
                items,
                hold_open: false,
            })
        }

        /// Next subscription yields `items`, then stays open.
        pub fn then_hold(self, items: Vec<Result<ChangeNotification, FeedError>>) -> Self {
            self.push(Scripted::Stream {
                items,
                hold_open: true,
            })
        }

        /// Number of subscription attempts so far.
        pub fn subscribe_count(&self) -> usize {
            self.subscribe_count.load(Ordering::SeqCst)
        }

        fn push(self, step: Scripted) -> Self {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(step);
            self
        }
    }

    #[async_trait::async_trait]
    impl ChangeFeed for ScriptedChangeFeed {
        async fn subscribe(&self) -> Result<NotificationStream, FeedError> {
            self.subscribe_count.fetch_add(1, Ordering::SeqCst);

            let step = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            match step {
                Some(Scripted::Fail(error)) => Err(error),
                Some(Scripted::Stream {
                    items,
                    hold_open: false,
                }) => Ok(stream::iter(items).boxed()),
                Some(Scripted::Stream {
                    items,
                    hold_open: true,
                }) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
                None => Ok(stream::pending().boxed()),
            }
        }
    }
}
