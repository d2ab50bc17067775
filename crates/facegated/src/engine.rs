use async_trait::async_trait;
use facegate_core::{
    primary_face, DetectorError, Embedding, FaceDetector, FaceRecognizer, ImageError, RecognizerError,
    RgbFrame, EMBEDDING_MODEL_VERSION,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Image(#[from] ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Turns an uploaded image into a face embedding.
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    /// Decode `image`, find its primary face and embed it.
    async fn encode(&self, image: Vec<u8>) -> Result<Embedding, EngineError>;

    /// Version tag of the embedding model.
    fn model_version(&self) -> &str;
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Encode {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

#[async_trait]
impl FaceEncoder for EngineHandle {
    async fn encode(&self, image: Vec<u8>) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    fn model_version(&self) -> &str {
        EMBEDDING_MODEL_VERSION
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Both ONNX sessions are loaded synchronously before the thread starts so a
/// missing model fails startup rather than the first request. The sessions
/// need exclusive access while running; the thread owns them and serves
/// encode requests one at a time.
pub fn spawn_engine(detector_path: &str, recognizer_path: &str) -> Result<EngineHandle, EngineError> {
    let mut detector = FaceDetector::load(detector_path)?;
    tracing::info!(path = detector_path, "SCRFD detector loaded");

    let mut recognizer = FaceRecognizer::load(recognizer_path)?;
    tracing::info!(path = recognizer_path, "ArcFace recognizer loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { image, reply } => {
                        let result = run_encode(&mut detector, &mut recognizer, &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Decode the upload, pick the primary face and extract its embedding.
fn run_encode(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    image: &[u8],
) -> Result<Embedding, EngineError> {
    let frame = RgbFrame::decode(image)?;
    let faces = detector.detect(&frame)?;

    let face = primary_face(&faces).ok_or(EngineError::NoFaceDetected)?;
    tracing::debug!(
        detected = faces.len(),
        confidence = face.confidence,
        width = face.width,
        height = face.height,
        "primary face selected"
    );

    Ok(recognizer.extract(&frame, face)?)
}
