use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Trait for implementing inference models that can be used with the [`InferenceEngine`].
///
/// The model is moved into the engine's worker thread, so it is loaded once
/// and then shared by every request that goes through the engine.
pub trait InferenceModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Represents the current state of the inference engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceEngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
    Processing,
}

impl InferenceEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceEngineState::Idle => "idle",
            InferenceEngineState::Processing => "processing",
        }
    }
}

/// Errors reported by the engine itself, or forwarded from the model.
#[derive(Debug, thiserror::Error)]
pub enum EngineError<E: std::error::Error + 'static> {
    /// The engine was stopped and no longer accepts requests.
    #[error("inference engine is stopped")]
    Stopped,
    /// The worker went away before answering.
    #[error("inference worker disconnected before replying")]
    Disconnected,
    /// The model failed on this request.
    #[error(transparent)]
    Model(E),
}

/// Response returned by the engine containing both the model's response and telemetry data.
#[derive(Debug)]
pub struct EngineResponse<Res> {
    /// Unique identifier of the request, increasing in submission order.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// The actual response from the model.
    pub response: Res,
}

type Reply<M> = Result<
    EngineResponse<<M as InferenceModel>::Response>,
    <M as InferenceModel>::Error,
>;

struct EngineRequest<M: InferenceModel> {
    id: u64,
    request: M::Request,
    reply: mpsc::Sender<Reply<M>>,
}

/// Handle to a request that was queued on the engine.
pub struct PendingInference<M: InferenceModel> {
    id: u64,
    reply: mpsc::Receiver<Reply<M>>,
}

impl<M: InferenceModel> PendingInference<M> {
    /// Identifier assigned to the request at submission.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the worker has run the request.
    ///
    /// Call it from a blocking context (a plain thread or
    /// `tokio::task::spawn_blocking`), never directly on an async executor.
    pub fn wait(self) -> Result<EngineResponse<M::Response>, EngineError<M::Error>> {
        match self.reply.recv() {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(EngineError::Model(e)),
            Err(mpsc::RecvError) => Err(EngineError::Disconnected),
        }
    }
}

/// Inference engine that owns a model and runs it on a dedicated thread.
///
/// Requests are queued and served one at a time; every submission gets its
/// own reply channel, so callers only ever see the result of their request.
/// A failing request does not stop the worker.
pub struct InferenceEngine<M>
where
    M: InferenceModel + Send + 'static,
    M::Request: Send + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<InferenceEngineState>>,
    req_tx: Mutex<Option<mpsc::Sender<EngineRequest<M>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    id_counter: AtomicU64,
}

impl<M> InferenceEngine<M>
where
    M: InferenceModel + Send + 'static,
    M::Request: Send + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with the given model.
    ///
    /// The model is moved to a background thread which handles the queued
    /// requests until the engine is stopped or dropped.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest<M>>();
        let state = Arc::new(Mutex::new(InferenceEngineState::Idle));

        let worker = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference #{}", req.id);

                    set_state(&state, InferenceEngineState::Processing);
                    let start_time = Instant::now();

                    let result = model.run(req.request).map(|response| EngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        response,
                    });

                    match &result {
                        Ok(r) => log::debug!("Inference #{} completed in {:?}", r.id, r.duration),
                        Err(e) => log::debug!("Inference #{} failed: {e}", req.id),
                    }

                    // the caller may have given up waiting
                    let _ = req.reply.send(result);

                    set_state(&state, InferenceEngineState::Idle);
                }
                log::debug!("Inference worker exiting");
            }
        });

        Self {
            state,
            req_tx: Mutex::new(Some(req_tx)),
            worker: Mutex::new(Some(worker)),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InferenceEngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a request for the worker thread.
    ///
    /// # Errors
    /// Returns [`EngineError::Stopped`] once [`InferenceEngine::stop`] was called.
    pub fn submit(
        &self,
        request: M::Request,
    ) -> Result<PendingInference<M>, EngineError<M::Error>> {
        let guard = self.req_tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(EngineError::Stopped)?;

        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = mpsc::channel();

        tx.send(EngineRequest {
            id,
            request,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::Stopped)?;

        Ok(PendingInference {
            id,
            reply: reply_rx,
        })
    }

    /// Submits a request and blocks until it has run.
    pub fn run_blocking(
        &self,
        request: M::Request,
    ) -> Result<EngineResponse<M::Response>, EngineError<M::Error>> {
        self.submit(request)?.wait()
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// Requests already queued are still served before the worker exits.
    pub fn stop(&self) {
        self.req_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl<M> Drop for InferenceEngine<M>
where
    M: InferenceModel + Send + 'static,
    M::Request: Send + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<InferenceEngineState>, value: InferenceEngineState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("odd input {0}")]
    struct OddInput(u32);

    /// Doubles even numbers, rejects odd ones.
    struct Doubler;

    impl InferenceModel for Doubler {
        type Request = u32;
        type Response = u32;
        type Error = OddInput;

        fn run(&mut self, request: u32) -> Result<u32, OddInput> {
            if request % 2 == 1 {
                return Err(OddInput(request));
            }
            Ok(request * 2)
        }
    }

    #[test]
    fn runs_requests_and_reports_telemetry() {
        let engine = InferenceEngine::new(Doubler);
        let response = engine.run_blocking(4).unwrap();
        assert_eq!(response.response, 8);
        assert_eq!(response.id, 0);
        assert!(response.start_time <= Instant::now());
    }

    #[test]
    fn model_error_only_fails_its_own_request() {
        let engine = InferenceEngine::new(Doubler);
        let err = engine.run_blocking(3).unwrap_err();
        assert!(matches!(err, EngineError::Model(OddInput(3))));
        assert_eq!(err.to_string(), "odd input 3");

        let ok = engine.run_blocking(10).unwrap();
        assert_eq!(ok.response, 20);
    }

    #[test]
    fn ids_increase_in_submission_order() {
        let engine = InferenceEngine::new(Doubler);
        let first = engine.submit(2).unwrap();
        let second = engine.submit(6).unwrap();
        assert!(first.id() < second.id());

        assert_eq!(second.wait().unwrap().response, 12);
        assert_eq!(first.wait().unwrap().response, 4);
    }

    #[test]
    fn submit_after_stop_is_rejected() {
        let engine = InferenceEngine::new(Doubler);
        engine.stop();
        assert!(matches!(engine.submit(2), Err(EngineError::Stopped)));
        assert_eq!(engine.state(), InferenceEngineState::Idle);
    }

    #[test]
    fn serves_concurrent_callers() {
        let engine = Arc::new(InferenceEngine::new(Doubler));
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.run_blocking(i * 2).unwrap().response)
            })
            .collect();

        let mut results: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, (0..8u32).map(|i| i * 4).collect::<Vec<_>>());
    }
}
