use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, error, info};
use synced_decode::AudioSource;
use synced_transport::TrackId;
use tokio::sync::{mpsc, oneshot};

use crate::error::{PlayerError, Result};
use crate::session::Session;

type Job = Box<dyn FnOnce(&mut Session) + Send>;

enum Request {
    Run(Job),
    AddTrack {
        source: AudioSource,
        reply: oneshot::Sender<Result<TrackId>>,
    },
}

/// Serializes every state access onto one worker thread.
///
/// The worker owns the [`Session`] and drives a single-threaded tokio
/// runtime, so an in-flight `add_track` (decode and resample) finishes
/// before the next request is looked at. Callers block until their request
/// has been handled.
pub struct Gate {
    requests: Option<mpsc::UnboundedSender<Request>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl Gate {
    /// Spawn the worker. `init` builds the session on the worker thread, so
    /// the session itself never has to cross threads.
    pub fn start<F>(init: F) -> Result<Self>
    where
        F: FnOnce() -> Session + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(PlayerError::WorkerStart)?;
        let (requests, receiver) = mpsc::unbounded_channel();

        let worker = thread::Builder::new()
            .name("synced-player".into())
            .spawn(move || {
                let mut session = init();
                runtime.block_on(serve(&mut session, receiver));
            })
            .map_err(PlayerError::WorkerStart)?;
        let worker_id = worker.thread().id();
        info!("player worker started");

        Ok(Self {
            requests: Some(requests),
            worker: Some(worker),
            worker_id,
        })
    }

    /// Run `f` against the session and wait for its result.
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.check_caller()?;
        let (reply, response) = oneshot::channel();
        self.send(Request::Run(Box::new(move |session| {
            let _ = reply.send(f(session));
        })))?;
        response.blocking_recv().map_err(|_| PlayerError::WorkerUnavailable)
    }

    pub fn add_track(&self, source: AudioSource) -> Result<TrackId> {
        self.check_caller()?;
        let (reply, response) = oneshot::channel();
        self.send(Request::AddTrack { source, reply })?;
        response.blocking_recv().map_err(|_| PlayerError::WorkerUnavailable)?
    }

    fn check_caller(&self) -> Result<()> {
        if thread::current().id() == self.worker_id {
            return Err(PlayerError::ReentrantCall);
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(PlayerError::AsyncContext);
        }
        Ok(())
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .as_ref()
            .ok_or(PlayerError::WorkerUnavailable)?
            .send(request)
            .map_err(|_| PlayerError::WorkerUnavailable)
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        self.requests.take();

        let Some(worker) = self.worker.take() else {
            return;
        };
        if thread::current().id() == self.worker_id {
            return;
        }
        if worker.join().is_err() {
            error!("player worker panicked");
        }
    }
}

async fn serve(session: &mut Session, mut requests: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = requests.recv().await {
        match request {
            Request::Run(job) => job(session),
            Request::AddTrack { source, reply } => {
                let result = session.add_track(source).await;
                let _ = reply.send(result);
            }
        }
    }
    debug!("player worker stopped");
}
