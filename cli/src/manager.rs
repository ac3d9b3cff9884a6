//! Shared handle on credentials and the API client.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use sarufi_core::{RequestContext, Sarufi, SarufiClient, Transport, UreqTransport};
use tracing::info;

use crate::config::{Credentials, Settings};

/// Serialises credential changes and token refreshes across callers.
pub struct Manager<T = UreqTransport> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    credentials: Credentials,
    api: Sarufi<T>,
}

impl Manager<UreqTransport> {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_transport(settings, UreqTransport::new())
    }
}

impl<T: Transport> Manager<T> {
    pub fn with_transport(settings: &Settings, transport: T) -> Self {
        let mut client = SarufiClient::new(&settings.base_url).with_context(RequestContext {
            timeout: settings.timeout,
        });
        if let Some(token) = &settings.token {
            client.set_token(token.clone());
        }
        Self {
            inner: Mutex::new(Inner {
                credentials: settings.credentials.clone(),
                api: Sarufi::new(client, transport),
            }),
        }
    }

    pub fn credentials(&self) -> Credentials {
        self.inner.lock().credentials.clone()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        let mut inner = self.inner.lock();
        inner.credentials = credentials;
        inner.api.client_mut().clear_token();
    }

    pub fn token(&self) -> Option<String> {
        self.inner.lock().api.client().token().map(str::to_string)
    }

    /// Run `f` against the API without requiring a token.
    pub fn with_api<R>(&self, f: impl FnOnce(&mut Sarufi<T>) -> R) -> R {
        f(&mut self.inner.lock().api)
    }

    /// Run `f` against the API, logging in with the stored credentials first
    /// when no token is set.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Sarufi<T>) -> Result<R>) -> Result<R> {
        let mut inner = self.inner.lock();
        if inner.api.client().token().is_none() {
            if !inner.credentials.is_complete() {
                bail!(
                    "not signed in: pass --token, set SARUFI_TOKEN, or configure \
                     SARUFI_PLATFORM_USERNAME and SARUFI_PLATFORM_PASSWORD"
                );
            }
            let Inner { credentials, api } = &mut *inner;
            api.authenticate(&credentials.username, &credentials.password)
                .context("signing in with configured credentials")?;
            info!(username = %credentials.username, "signed in");
        }
        f(&mut inner.api)
    }
}
