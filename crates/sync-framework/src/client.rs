//! # Generic Client
//!
//! The cloneable handle used to send requests to a [`SyncActor`](crate::SyncActor).

use crate::entity::{SourceId, SyncKind};
use crate::error::FrameworkError;
use crate::message::SyncRequest;
use crate::outcome::{SyncOutcome, SyncStats};
use std::marker::PhantomData;
use tokio::sync::{mpsc, oneshot};

/// A type-safe client for the synchronizer of kind `E`.
///
/// Holds only a sender, so cloning is cheap. The type parameter keeps a customer client from
/// being handed to the origin queue.
pub struct SyncClient<E> {
    sender: mpsc::Sender<SyncRequest>,
    _kind: PhantomData<fn() -> E>,
}

impl<E> Clone for SyncClient<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E: SyncKind> SyncClient<E> {
    pub fn new(sender: mpsc::Sender<SyncRequest>) -> Self {
        Self {
            sender,
            _kind: PhantomData,
        }
    }

    pub async fn sync(&self, id: SourceId) -> Result<SyncOutcome, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SyncRequest::Sync { id, respond_to })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    pub async fn stats(&self) -> Result<SyncStats, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SyncRequest::Stats { respond_to })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }
}
