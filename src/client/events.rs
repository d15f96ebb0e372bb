//! Server event dispatch
//!
//! Handlers are kept per event type and run in registration order. Each
//! delivery runs on its own task, so a slow handler never stalls the
//! receive loop or other deliveries. A failing or panicking handler is
//! logged and the remaining handlers still run.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::common::Result;

use super::response::Event;

type SyncHandler = dyn Fn(&Event) -> Result<()> + Send + Sync;
type AsyncHandler = dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// A registered event handler
#[derive(Clone)]
pub enum EventHandler {
    /// Runs to completion on the delivery task
    Sync(Arc<SyncHandler>),
    /// Awaited in place before the next handler for the same event runs
    Async(Arc<AsyncHandler>),
}

impl EventHandler {
    /// Wrap an ordinary handler
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wrap a suspending handler
    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |event| Box::pin(f(event))))
    }

    async fn call(&self, event: &Event) -> std::result::Result<(), String> {
        let outcome = match self {
            EventHandler::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(event))),
            EventHandler::Async(f) => AssertUnwindSafe(f(event.clone())).catch_unwind().await,
        };
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("handler panicked".to_string()),
        }
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventHandler::Sync(_) => f.write_str("EventHandler::Sync"),
            EventHandler::Async(_) => f.write_str("EventHandler::Async"),
        }
    }
}

/// Routes pushed events to their handlers
#[derive(Debug, Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`
    pub fn add(&self, event_type: &str, handler: EventHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        handlers.entry(event_type.to_string()).or_default().push(handler);
    }

    /// Drop the handlers for one event type, or all of them
    pub fn remove(&self, event_type: Option<&str>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        match event_type {
            Some(event_type) => {
                handlers.remove(event_type);
            }
            None => handlers.clear(),
        }
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        handlers.get(event_type).map_or(0, Vec::len)
    }

    fn snapshot(&self, event_type: &str) -> Vec<EventHandler> {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        handlers.get(event_type).cloned().unwrap_or_default()
    }

    /// Deliver an event on a background task
    pub fn dispatch(self: &Arc<Self>, event: Event) {
        if self.handler_count(&event.event_type) == 0 {
            tracing::debug!("No handlers for event '{}'", event.event_type);
            return;
        }
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.deliver(&event).await;
        });
    }

    /// Run every handler for the event in order, returning how many failed
    pub async fn deliver(&self, event: &Event) -> usize {
        let mut failures = 0;
        for (index, handler) in self.snapshot(&event.event_type).iter().enumerate() {
            if let Err(e) = handler.call(event).await {
                failures += 1;
                tracing::warn!(
                    "Event handler {} for '{}' failed: {}",
                    index,
                    event.event_type,
                    e
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use serde_json::Map;
    use std::sync::Mutex;
    use std::time::Duration;

    fn event(event_type: &str) -> Event {
        Event {
            event_type: event_type.to_string(),
            data: Map::new(),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> EventHandler {
        let log = Arc::clone(log);
        EventHandler::sync(move |_| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.add("changed", recorder(&log, "first"));
        {
            let log = Arc::clone(&log);
            dispatcher.add(
                "changed",
                EventHandler::suspending(move |_| {
                    let log = Arc::clone(&log);
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        log.lock().unwrap().push("slow".to_string());
                        Ok::<(), Error>(())
                    }
                }),
            );
        }
        dispatcher.add("changed", recorder(&log, "last"));

        assert_eq!(dispatcher.deliver(&event("changed")).await, 0);
        assert_eq!(*log.lock().unwrap(), ["first", "slow", "last"]);
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_stop_dispatch() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.add(
            "x",
            EventHandler::sync(|_| Err(Error::Internal("boom".to_string()))),
        );
        dispatcher.add("x", EventHandler::sync(|_| panic!("handler bug")));
        dispatcher.add(
            "x",
            EventHandler::suspending(|_| async {
                Err::<(), Error>(Error::Internal("async boom".into()))
            }),
        );
        dispatcher.add("x", recorder(&log, "survivor"));

        assert_eq!(dispatcher.deliver(&event("x")).await, 3);
        assert_eq!(*log.lock().unwrap(), ["survivor"]);
    }

    #[tokio::test]
    async fn test_only_matching_event_type_runs() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add("a", recorder(&log, "a"));
        dispatcher.add("b", recorder(&log, "b"));

        dispatcher.deliver(&event("b")).await;
        dispatcher.deliver(&event("c")).await;
        assert_eq!(*log.lock().unwrap(), ["b"]);
    }

    #[test]
    fn test_remove_one_or_all() {
        let dispatcher = EventDispatcher::new();
        dispatcher.add("a", EventHandler::sync(|_| Ok(())));
        dispatcher.add("a", EventHandler::sync(|_| Ok(())));
        dispatcher.add("b", EventHandler::sync(|_| Ok(())));
        assert_eq!(dispatcher.handler_count("a"), 2);

        dispatcher.remove(Some("a"));
        assert_eq!(dispatcher.handler_count("a"), 0);
        assert_eq!(dispatcher.handler_count("b"), 1);

        dispatcher.remove(None);
        assert_eq!(dispatcher.handler_count("b"), 0);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        dispatcher.add(
            "ping",
            EventHandler::sync(move |e| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(e.event_type.clone());
                }
                Ok(())
            }),
        );

        dispatcher.dispatch(event("ping"));
        let got = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(got, "ping");
    }
}
