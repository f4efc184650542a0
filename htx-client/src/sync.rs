//! Blocking client wrapper (§4.12's Open Question: sync and async
//! surfaces share one result shape). `http_client_base.hpp` draws this
//! line with `requires` clauses gating synchronous-callback overloads on
//! an `async_client`-style `run()` method; this port instead gives the
//! whole synchronous surface a dedicated single-threaded [`tokio::runtime::
//! Runtime`] and blocks on the same [`Client`] methods the async caller
//! uses, so there is exactly one implementation of the protocol logic.

use crate::client::{Client, Response};
use crate::config::ClientConfig;
use crate::connection::StreamResult;
use crate::error::Result;
use crate::form::Form;

/// A [`Client`] plus a private runtime to drive it from non-async code.
pub struct SyncClient {
    client: Client,
    runtime: tokio::runtime::Runtime,
}

impl SyncClient {
    pub fn new(config: ClientConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(SyncClient { client: Client::new(config), runtime })
    }

    pub fn get(&self, url: &str) -> Result<Response> {
        self.runtime.block_on(self.client.get(url))
    }

    pub fn head(&self, url: &str) -> Result<Response> {
        self.runtime.block_on(self.client.head(url))
    }

    pub fn delete(&self, url: &str) -> Result<Response> {
        self.runtime.block_on(self.client.delete(url))
    }

    pub fn options(&self, url: &str) -> Result<Response> {
        self.runtime.block_on(self.client.options(url))
    }

    pub fn post(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.runtime.block_on(self.client.post(url, body, content_type))
    }

    pub fn put(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.runtime.block_on(self.client.put(url, body, content_type))
    }

    pub fn patch(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.runtime.block_on(self.client.patch(url, body, content_type))
    }

    pub fn post_form(&self, url: &str, form: Form) -> Result<Response> {
        self.runtime.block_on(self.client.post_form(url, form))
    }

    pub fn get_streaming(&self, url: &str, on_chunk: impl FnMut(&[u8], u64, u64) -> bool) -> Result<StreamResult> {
        self.runtime.block_on(self.client.get_streaming(url, on_chunk))
    }

    /// Direct access to the underlying async client, e.g. to build a
    /// [`crate::request::RequestBuilder`] or upgrade to a WebSocket inside
    /// `self.runtime.block_on(...)`.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_a_working_runtime() {
        let client = SyncClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.inner().pool_size(), 0);
    }
}
