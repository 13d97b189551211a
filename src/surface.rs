//! Capability traits over the shared browser page.
//!
//! Components take the narrowest trait they need by reference. Only one
//! component drives the page at a time; nothing here is meant to be called
//! concurrently.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BotError;

/// Page navigation and settle waits.
#[async_trait]
pub trait Navigate: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BotError>;

    /// Load `url` in a clean tab. Implementations without tabs just navigate.
    async fn open_fresh(&self, url: &str) -> Result<(), BotError> {
        self.navigate(url).await
    }

    async fn current_url(&self) -> Result<String, BotError>;

    /// Fixed pause to let the page render.
    async fn wait_settle(&self, hint: Duration) {
        tokio::time::sleep(hint).await;
    }
}

/// Element queries, clicks and script execution on the current page.
#[async_trait]
pub trait Interact: Navigate {
    type Element: Send + Sync;

    async fn query_single(&self, selector: &str) -> Result<Self::Element, BotError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>, BotError>;

    /// Descendant of `parent` matching `selector`, if any.
    async fn query_within(
        &self,
        parent: &Self::Element,
        selector: &str,
    ) -> Result<Option<Self::Element>, BotError>;

    async fn text(&self, element: &Self::Element) -> Result<String, BotError>;

    async fn click(&self, element: &Self::Element) -> Result<(), BotError>;

    /// Click through `element.click()` in page script; works on covered elements.
    async fn click_via_script(&self, element: &Self::Element) -> Result<(), BotError>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<(), BotError>;

    async fn run_script(&self, code: &str) -> Result<Value, BotError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory page used by component tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct FakeElement {
        pub id: usize,
        pub label: String,
    }

    #[derive(Default)]
    struct FakeState {
        url: String,
        redirects: HashMap<String, String>,
        navigations: Vec<String>,
        fresh_loads: u32,
        elements: HashMap<String, Vec<FakeElement>>,
        children: HashMap<(usize, String), FakeElement>,
        texts: HashMap<usize, String>,
        failing_clicks: Vec<String>,
        failing_navigations: HashMap<String, u32>,
        missing_queries: HashMap<String, u32>,
        channel_messages: HashMap<String, Vec<String>>,
        active_channel: Option<String>,
        clicks: Vec<String>,
        typed: Vec<(String, String)>,
        scripts: Vec<String>,
        settles: u32,
        next_id: usize,
    }

    /// Records every interaction. Clicking an element labelled
    /// `channel:<name>` makes `<name>` the channel the read script returns.
    #[derive(Default)]
    pub(crate) struct FakeSurface {
        state: Mutex<FakeState>,
    }

    impl FakeSurface {
        pub fn new() -> Self {
            Self::default()
        }

        fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
            let mut state = self.state.lock().unwrap();
            f(&mut state)
        }

        /// Navigating to `from` lands on `to`.
        pub fn redirect(&self, from: &str, to: &str) {
            self.with_state(|s| s.redirects.insert(from.to_string(), to.to_string()));
        }

        pub fn clear_redirects(&self) {
            self.with_state(|s| s.redirects.clear());
        }

        pub fn add_element(&self, selector: &str, label: &str, text: &str) -> FakeElement {
            self.with_state(|s| {
                s.next_id += 1;
                let el = FakeElement {
                    id: s.next_id,
                    label: label.to_string(),
                };
                s.texts.insert(el.id, text.to_string());
                s.elements
                    .entry(selector.to_string())
                    .or_default()
                    .push(el.clone());
                el
            })
        }

        pub fn add_child(
            &self,
            parent: &FakeElement,
            selector: &str,
            label: &str,
            text: &str,
        ) -> FakeElement {
            self.with_state(|s| {
                s.next_id += 1;
                let el = FakeElement {
                    id: s.next_id,
                    label: label.to_string(),
                };
                s.texts.insert(el.id, text.to_string());
                s.children
                    .insert((parent.id, selector.to_string()), el.clone());
                el
            })
        }

        /// Register a channel control under `selector` with its visible messages.
        pub fn add_channel(&self, selector: &str, name: &str, messages: &[&str]) {
            self.add_element(selector, &format!("channel:{name}"), name);
            self.set_messages(name, messages);
        }

        pub fn set_messages(&self, channel: &str, messages: &[&str]) {
            self.with_state(|s| {
                s.channel_messages.insert(
                    channel.to_string(),
                    messages.iter().map(|m| m.to_string()).collect(),
                )
            });
        }

        /// The next `times` lookups of `selector` find nothing.
        pub fn hide_for(&self, selector: &str, times: u32) {
            self.with_state(|s| s.missing_queries.insert(selector.to_string(), times));
        }

        /// Clicks on elements with `label` fail.
        pub fn fail_clicks_on(&self, label: &str) {
            self.with_state(|s| s.failing_clicks.push(label.to_string()));
        }

        /// Loads of `url` succeed `successes` more times, then always fail.
        pub fn fail_navigation_after(&self, url: &str, successes: u32) {
            self.with_state(|s| s.failing_navigations.insert(url.to_string(), successes));
        }

        pub fn clicks(&self) -> Vec<String> {
            self.with_state(|s| s.clicks.clone())
        }

        pub fn navigations(&self) -> Vec<String> {
            self.with_state(|s| s.navigations.clone())
        }

        pub fn fresh_loads(&self) -> u32 {
            self.with_state(|s| s.fresh_loads)
        }

        pub fn typed(&self) -> Vec<(String, String)> {
            self.with_state(|s| s.typed.clone())
        }

        pub fn scripts(&self) -> Vec<String> {
            self.with_state(|s| s.scripts.clone())
        }

        pub fn settles(&self) -> u32 {
            self.with_state(|s| s.settles)
        }

        fn lookup(&self, selector: &str) -> Vec<FakeElement> {
            self.with_state(|s| {
                if let Some(remaining) = s.missing_queries.get_mut(selector) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Vec::new();
                    }
                }
                s.elements.get(selector).cloned().unwrap_or_default()
            })
        }

        fn record_click(&self, element: &FakeElement) -> Result<(), BotError> {
            self.with_state(|s| {
                if s.failing_clicks.contains(&element.label) {
                    return Err(BotError::surface(&element.label, "click intercepted"));
                }
                s.clicks.push(element.label.clone());
                if let Some(channel) = element.label.strip_prefix("channel:") {
                    s.active_channel = Some(channel.to_string());
                }
                Ok(())
            })
        }
    }

    #[async_trait]
    impl Navigate for FakeSurface {
        async fn navigate(&self, url: &str) -> Result<(), BotError> {
            self.with_state(|s| {
                if let Some(remaining) = s.failing_navigations.get_mut(url) {
                    if *remaining == 0 {
                        return Err(BotError::surface(url, "page crashed"));
                    }
                    *remaining -= 1;
                }
                s.navigations.push(url.to_string());
                s.url = s.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
                s.active_channel = None;
                Ok(())
            })
        }

        async fn open_fresh(&self, url: &str) -> Result<(), BotError> {
            self.with_state(|s| s.fresh_loads += 1);
            self.navigate(url).await
        }

        async fn current_url(&self) -> Result<String, BotError> {
            Ok(self.with_state(|s| s.url.clone()))
        }

        async fn wait_settle(&self, _hint: Duration) {
            self.with_state(|s| s.settles += 1);
        }
    }

    #[async_trait]
    impl Interact for FakeSurface {
        type Element = FakeElement;

        async fn query_single(&self, selector: &str) -> Result<FakeElement, BotError> {
            self.lookup(selector)
                .into_iter()
                .next()
                .ok_or_else(|| BotError::surface(selector, "element not found"))
        }

        async fn query_all(&self, selector: &str) -> Result<Vec<FakeElement>, BotError> {
            Ok(self.lookup(selector))
        }

        async fn query_within(
            &self,
            parent: &FakeElement,
            selector: &str,
        ) -> Result<Option<FakeElement>, BotError> {
            Ok(self.with_state(|s| s.children.get(&(parent.id, selector.to_string())).cloned()))
        }

        async fn text(&self, element: &FakeElement) -> Result<String, BotError> {
            Ok(self.with_state(|s| s.texts.get(&element.id).cloned().unwrap_or_default()))
        }

        async fn click(&self, element: &FakeElement) -> Result<(), BotError> {
            self.record_click(element)
        }

        async fn click_via_script(&self, element: &FakeElement) -> Result<(), BotError> {
            self.record_click(element)
        }

        async fn type_text(&self, element: &FakeElement, text: &str) -> Result<(), BotError> {
            self.with_state(|s| s.typed.push((element.label.clone(), text.to_string())));
            Ok(())
        }

        async fn run_script(&self, code: &str) -> Result<Value, BotError> {
            Ok(self.with_state(|s| {
                s.scripts.push(code.to_string());
                let messages = s
                    .active_channel
                    .as_ref()
                    .and_then(|c| s.channel_messages.get(c))
                    .cloned()
                    .unwrap_or_default();
                Value::from(messages)
            }))
        }
    }
}
