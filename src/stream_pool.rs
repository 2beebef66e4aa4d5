// THEORY:
// The `StreamPool` runs many detectors side by side, one per camera stream.
// Each stream gets its own tokio task that owns a `LeftThingsDetector` outright
// and drains a command channel. Because the detector never leaves its task,
// frames and settings for one stream are serialized by construction, while
// different streams proceed independently.
//
// Key architectural principles:
// 1.  **Actor per stream**: Callers talk to a stream only through
//     `StreamCommand`s; each command carries a oneshot sender for its reply.
// 2.  **Arrival order**: A stream's task handles commands strictly in the order
//     they were sent.
// 3.  **Clean shutdown**: Dropping a stream's sender ends its loop; `shutdown`
//     drops them all and awaits every task.

use crate::core_modules::frame::Frame;
use crate::core_modules::settings::SettingsMap;
use crate::detector::{LeftThingsDetector, Report};
use crate::error::DetectorError;
use futures::future::join_all;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Stream already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Stream {0} has stopped")]
    Stopped(String),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// A request to one stream's detector.
pub enum StreamCommand {
    Frame {
        frame: Frame,
        reply: oneshot::Sender<Report>,
    },
    SetSettings {
        params: SettingsMap,
        reply: oneshot::Sender<Result<(), DetectorError>>,
    },
    GetSettings {
        reply: oneshot::Sender<SettingsMap>,
    },
    On {
        reply: oneshot::Sender<()>,
    },
    Off {
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<bool>,
    },
}

struct StreamHandle {
    sender: mpsc::UnboundedSender<StreamCommand>,
    task: JoinHandle<()>,
}

/// Owns one detector task per registered stream.
#[derive(Default)]
pub struct StreamPool {
    streams: HashMap<String, StreamHandle>,
}

impl StreamPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a task for `stream_id` that owns `detector`. Must be called from
    /// within a tokio runtime.
    pub fn register(
        &mut self,
        stream_id: impl Into<String>,
        detector: LeftThingsDetector,
    ) -> Result<(), StreamError> {
        let stream_id = stream_id.into();
        if self.streams.contains_key(&stream_id) {
            return Err(StreamError::AlreadyRegistered(stream_id));
        }

        let (sender, receiver) = mpsc::unbounded_channel::<StreamCommand>();
        let task = tokio::spawn(run_stream(stream_id.clone(), detector, receiver));
        info!(stream = %stream_id, "stream registered");
        self.streams.insert(stream_id, StreamHandle { sender, task });
        Ok(())
    }

    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streams.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub async fn process_frame(&self, stream_id: &str, frame: Frame) -> Result<Report, StreamError> {
        self.request(stream_id, |reply| StreamCommand::Frame { frame, reply })
            .await
    }

    pub async fn set_settings(
        &self,
        stream_id: &str,
        params: SettingsMap,
    ) -> Result<(), StreamError> {
        self.request(stream_id, |reply| StreamCommand::SetSettings { params, reply })
            .await??;
        Ok(())
    }

    pub async fn get_settings(&self, stream_id: &str) -> Result<SettingsMap, StreamError> {
        self.request(stream_id, |reply| StreamCommand::GetSettings { reply })
            .await
    }

    pub async fn on(&self, stream_id: &str) -> Result<(), StreamError> {
        self.request(stream_id, |reply| StreamCommand::On { reply }).await
    }

    pub async fn off(&self, stream_id: &str) -> Result<(), StreamError> {
        self.request(stream_id, |reply| StreamCommand::Off { reply }).await
    }

    pub async fn state(&self, stream_id: &str) -> Result<bool, StreamError> {
        self.request(stream_id, |reply| StreamCommand::State { reply }).await
    }

    /// Stops one stream and waits for its task to finish.
    pub async fn remove(&mut self, stream_id: &str) -> Result<(), StreamError> {
        let handle = self
            .streams
            .remove(stream_id)
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))?;
        drop(handle.sender);
        if let Err(err) = handle.task.await {
            warn!(stream = %stream_id, error = %err, "stream task ended abnormally");
        }
        Ok(())
    }

    /// Stops every stream and waits for all tasks to finish.
    pub async fn shutdown(self) {
        let tasks: Vec<JoinHandle<()>> = self
            .streams
            .into_values()
            .map(|handle| {
                drop(handle.sender);
                handle.task
            })
            .collect();
        let count = tasks.len();
        for result in join_all(tasks).await {
            if let Err(err) = result {
                warn!(error = %err, "stream task ended abnormally");
            }
        }
        info!(streams = count, "stream pool shut down");
    }

    async fn request<T>(
        &self,
        stream_id: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> StreamCommand,
    ) -> Result<T, StreamError> {
        let handle = self
            .streams
            .get(stream_id)
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))?;
        let (reply, response) = oneshot::channel();
        handle
            .sender
            .send(build(reply))
            .map_err(|_| StreamError::Stopped(stream_id.to_string()))?;
        response
            .await
            .map_err(|_| StreamError::Stopped(stream_id.to_string()))
    }
}

async fn run_stream(
    stream_id: String,
    mut detector: LeftThingsDetector,
    mut receiver: mpsc::UnboundedReceiver<StreamCommand>,
) {
    while let Some(command) = receiver.recv().await {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            StreamCommand::Frame { frame, reply } => {
                let _ = reply.send(detector.execute(&frame));
            }
            StreamCommand::SetSettings { params, reply } => {
                let _ = reply.send(detector.set_settings(&params));
            }
            StreamCommand::GetSettings { reply } => {
                let _ = reply.send(detector.get_settings());
            }
            StreamCommand::On { reply } => {
                detector.on();
                let _ = reply.send(());
            }
            StreamCommand::Off { reply } => {
                detector.off();
                let _ = reply.send(());
            }
            StreamCommand::State { reply } => {
                let _ = reply.send(detector.state());
            }
        }
    }
    debug!(stream = %stream_id, "stream task finished");
}
