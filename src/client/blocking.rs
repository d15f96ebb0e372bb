//! Synchronous wrapper around [`WidgeteerClient`]
//!
//! The wrapper owns a private tokio runtime, created on first use and shut
//! down by [`BlockingClient::close`] or on drop. Calling it from inside an
//! async context is refused with [`Error::NestedRuntime`] instead of
//! deadlocking.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Handle, Runtime};

use crate::common::config::ServerConfig;
use crate::common::{Error, Result};

use super::client::{CommandList, CommandRequest, WidgeteerClient};
use super::events::EventHandler;
use super::options::{
    ClickOptions, DragOptions, FindOptions, KeyOptions, Point, ScreenshotOptions, ScrollOptions,
    TreeOptions, TypeOptions, WaitOptions,
};
use super::protocol::Params;
use super::response::Response;

/// Blocking Widgeteer client
pub struct BlockingClient {
    inner: WidgeteerClient,
    runtime: Mutex<Option<Runtime>>,
}

impl BlockingClient {
    pub fn new(server: &ServerConfig) -> Self {
        Self::from_client(WidgeteerClient::new(server))
    }

    pub fn from_client(inner: WidgeteerClient) -> Self {
        Self {
            inner,
            runtime: Mutex::new(None),
        }
    }

    /// The async client this wrapper drives
    pub fn inner(&self) -> &WidgeteerClient {
        &self.inner
    }

    fn runtime(&self) -> Result<MutexGuard<'_, Option<Runtime>>> {
        if Handle::try_current().is_ok() {
            return Err(Error::NestedRuntime);
        }
        let mut runtime = self.runtime.lock().unwrap_or_else(|p| p.into_inner());
        if runtime.is_none() {
            let built = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("widgeteer-client")
                .enable_all()
                .build()?;
            *runtime = Some(built);
        }
        Ok(runtime)
    }

    fn run<'a, F, Fut>(&'a self, op: F) -> Result<Fut::Output>
    where
        F: FnOnce(&'a WidgeteerClient) -> Fut,
        Fut: Future,
    {
        let guard = self.runtime()?;
        let runtime = guard
            .as_ref()
            .ok_or_else(|| Error::Internal("runtime missing after initialisation".to_string()))?;
        Ok(runtime.block_on(op(&self.inner)))
    }

    pub fn connect(&self) -> Result<()> {
        self.run(|c| c.connect())?
    }

    pub fn disconnect(&self) -> Result<()> {
        self.run(|c| c.disconnect())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Disconnect and shut the runtime down
    ///
    /// The runtime is recreated if the client is used again.
    pub fn close(&self) -> Result<()> {
        if self.inner.is_connected() {
            self.disconnect()?;
        }
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
        Ok(())
    }

    pub fn command(&self, name: &str, params: Params) -> Result<Response> {
        self.run(|c| c.command(name, params))
    }

    pub fn send(&self, request: CommandRequest) -> Result<Response> {
        self.run(|c| c.send(request))
    }

    pub fn batch(&self, commands: Vec<CommandRequest>) -> Result<Vec<Response>> {
        self.run(|c| c.batch(commands))
    }

    pub fn batch_commands(&self, commands: &[(&str, Params)]) -> Result<Vec<Response>> {
        self.run(|c| c.batch_commands(commands))
    }

    pub fn transaction(&self, steps: Vec<CommandRequest>, rollback_on_failure: bool) -> Result<Response> {
        self.run(|c| c.transaction(steps, rollback_on_failure))
    }

    pub fn subscribe(&self, event_type: &str, handler: EventHandler) -> Result<Response> {
        self.run(|c| c.subscribe(event_type, handler))
    }

    pub fn unsubscribe(&self, event_type: Option<&str>) -> Result<Response> {
        self.run(|c| c.unsubscribe(event_type))
    }

    pub fn start_recording(&self) -> Result<Response> {
        self.run(|c| c.start_recording())
    }

    pub fn stop_recording(&self) -> Result<Response> {
        self.run(|c| c.stop_recording())
    }

    pub fn tree(&self, options: &TreeOptions) -> Result<Response> {
        self.run(|c| c.tree(options))
    }

    pub fn find(&self, query: &str, options: &FindOptions) -> Result<Response> {
        self.run(|c| c.find(query, options))
    }

    pub fn describe(&self, target: &str) -> Result<Response> {
        self.run(|c| c.describe(target))
    }

    pub fn get_property(&self, target: &str, property: &str) -> Result<Response> {
        self.run(|c| c.get_property(target, property))
    }

    pub fn list_properties(&self, target: &str) -> Result<Response> {
        self.run(|c| c.list_properties(target))
    }

    pub fn get_actions(&self, target: &str) -> Result<Response> {
        self.run(|c| c.get_actions(target))
    }

    pub fn click(&self, target: &str, options: &ClickOptions) -> Result<Response> {
        self.run(|c| c.click(target, options))
    }

    pub fn double_click(&self, target: &str, pos: Option<Point>) -> Result<Response> {
        self.run(|c| c.double_click(target, pos))
    }

    pub fn right_click(&self, target: &str, pos: Option<Point>) -> Result<Response> {
        self.run(|c| c.right_click(target, pos))
    }

    pub fn input_text(&self, target: &str, text: &str, options: &TypeOptions) -> Result<Response> {
        self.run(|c| c.input_text(target, text, options))
    }

    pub fn type_text(&self, target: &str, text: &str, options: &TypeOptions) -> Result<Response> {
        self.input_text(target, text, options)
    }

    pub fn key(&self, target: &str, key: &str, options: &KeyOptions) -> Result<Response> {
        self.run(|c| c.key(target, key, options))
    }

    pub fn key_sequence(&self, target: &str, sequence: &str) -> Result<Response> {
        self.run(|c| c.key_sequence(target, sequence))
    }

    pub fn drag(&self, from: &str, to: &str, options: &DragOptions) -> Result<Response> {
        self.run(|c| c.drag(from, to, options))
    }

    pub fn scroll(&self, target: &str, options: &ScrollOptions) -> Result<Response> {
        self.run(|c| c.scroll(target, options))
    }

    pub fn hover(&self, target: &str, pos: Option<Point>) -> Result<Response> {
        self.run(|c| c.hover(target, pos))
    }

    pub fn focus(&self, target: &str) -> Result<Response> {
        self.run(|c| c.focus(target))
    }

    pub fn set_property(&self, target: &str, property: &str, value: Value) -> Result<Response> {
        self.run(|c| c.set_property(target, property, value))
    }

    pub fn set_value(&self, target: &str, value: Value) -> Result<Response> {
        self.run(|c| c.set_value(target, value))
    }

    pub fn invoke(&self, target: &str, method: &str) -> Result<Response> {
        self.run(|c| c.invoke(target, method))
    }

    pub fn screenshot(&self, options: &ScreenshotOptions) -> Result<Response> {
        self.run(|c| c.screenshot(options))
    }

    pub fn exists(&self, target: &str) -> Result<Response> {
        self.run(|c| c.exists(target))
    }

    pub fn is_visible(&self, target: &str) -> Result<Response> {
        self.run(|c| c.is_visible(target))
    }

    pub fn wait(&self, target: &str, options: &WaitOptions) -> Result<Response> {
        self.run(|c| c.wait(target, options))
    }

    pub fn wait_idle(&self, timeout_ms: u64) -> Result<Response> {
        self.run(|c| c.wait_idle(timeout_ms))
    }

    pub fn wait_signal(&self, target: &str, signal: &str, timeout_ms: u64) -> Result<Response> {
        self.run(|c| c.wait_signal(target, signal, timeout_ms))
    }

    pub fn sleep(&self, ms: u64) -> Result<Response> {
        self.run(|c| c.sleep(ms))
    }

    pub fn assert_property(
        &self,
        target: &str,
        property: &str,
        operator: &str,
        value: Value,
    ) -> Result<Response> {
        use super::client::CommandSink;
        self.run(|c| c.assert_property(target, property, operator, value))
    }

    pub fn call_service(&self, service: &str, method: &str, args: Option<Vec<Value>>) -> Result<Response> {
        self.run(|c| c.call_service(service, method, args))
    }

    pub fn list_services(&self) -> Result<Response> {
        self.run(|c| c.list_services())
    }

    pub fn list_custom_commands(&self) -> Result<Response> {
        self.run(|c| c.list_custom_commands())
    }

    pub fn list_commands(&self) -> Result<CommandList> {
        self.run(|c| c.list_commands())
    }

    pub fn quit(&self) -> Result<Response> {
        self.run(|c| c.quit())
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
