// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Remote registry
//!
//! Entry point of the remote layer. A registry is bound to one actor system, whose context codec
//! it uses on every connection, and keeps the endpoints it published per actor path.
//!

use crate::{
    Wire,
    config::RemoteConfig,
    connector::{self, RemoteHandle},
    publisher::{self, PublishedEndpoint},
};

use actor::{Actor, ActorPath, ActorRef, Error, Handler, SystemRef};

use tokio::sync::RwLock;
use tracing::debug;

use std::{collections::HashMap, sync::Arc};

/// Publishes local actors and connects to remote ones.
#[derive(Clone)]
pub struct RemoteRegistry {
    system: SystemRef,
    config: RemoteConfig,
    endpoints: Arc<RwLock<HashMap<ActorPath, Vec<PublishedEndpoint>>>>,
}

impl RemoteRegistry {
    pub fn new(system: SystemRef) -> Self {
        Self::with_config(system, RemoteConfig::default())
    }

    pub fn with_config(system: SystemRef, config: RemoteConfig) -> Self {
        Self {
            system,
            config,
            endpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Binds `address:port` and serves `actor` on it.
    ///
    /// Fails with `Error::Publish` if the address cannot be bound; nothing is registered then.
    /// Endpoints close when the actor system is stopped.
    pub async fn publish<A>(
        &self,
        actor: &ActorRef<A>,
        address: &str,
        port: u16,
    ) -> Result<PublishedEndpoint, Error>
    where
        A: Actor + Handler<A>,
        A::Message: Wire,
        A::Response: Wire,
    {
        let endpoint = publisher::publish(
            actor.clone(),
            address,
            port,
            self.system.codec(),
            self.config.clone(),
            self.system.cancellation_token().child_token(),
        )
        .await?;
        self.endpoints
            .write()
            .await
            .entry(actor.path())
            .or_default()
            .push(endpoint.clone());
        Ok(endpoint)
    }

    /// Closes every endpoint of `path`. Returns how many were closed.
    pub async fn unpublish(&self, path: &ActorPath) -> usize {
        let endpoints = self.endpoints.write().await.remove(path).unwrap_or_default();
        for endpoint in &endpoints {
            endpoint.close();
        }
        debug!("Unpublished {} endpoints of {}.", endpoints.len(), path);
        endpoints.len()
    }

    /// Open endpoints of `path`.
    pub async fn published(&self, path: &ActorPath) -> Vec<PublishedEndpoint> {
        self.endpoints
            .read()
            .await
            .get(path)
            .map(|endpoints| {
                endpoints
                    .iter()
                    .filter(|endpoint| !endpoint.is_closed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connects to the actor published on `address:port`.
    ///
    /// Fails with `Error::Connect` if the address is refused, unreachable, or speaks another
    /// protocol; no connection is left open then. The connection closes when the actor system
    /// is stopped.
    pub async fn connect<A>(
        &self,
        address: &str,
        port: u16,
    ) -> Result<RemoteHandle<A>, Error>
    where
        A: Actor + Handler<A>,
        A::Message: Wire,
        A::Response: Wire,
    {
        connector::connect(
            address,
            port,
            self.system.codec(),
            &self.config,
            self.system.cancellation_token().child_token(),
        )
        .await
    }
}
