//! Drawing recognition hook.
//!
//! A [`Recognizer`] turns a submitted canvas image into a text guess. The
//! guess re-enters the room as an `ai_guess` event, where it is broadcast
//! and compared against the current word. Recognition runs on its own
//! task and never blocks the room.

use std::future::Future;
use std::sync::Arc;

use doodlewire_protocol::RoomId;
use doodlewire_room::RoomStore;
use tokio::task::JoinHandle;

/// What a recognizer replies when it has nothing better to say.
pub const FALLBACK_GUESS: &str = "无法识别图像";

/// Errors a recognizer can report. None of them reach players.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// The submitted image was empty.
    #[error("image data is empty")]
    EmptyImage,

    /// The backend could not be reached.
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something unusable.
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// Produces a guess for a drawing.
///
/// Implement this to plug in a vision model. `image_data` is whatever the
/// client submitted, typically a `data:image/png;base64,...` URL.
///
/// ```rust,ignore
/// struct Vision { client: VisionClient }
///
/// impl Recognizer for Vision {
///     async fn recognize(&self, image_data: &str) -> Result<String, RecognitionError> {
///         self.client
///             .describe(image_data)
///             .await
///             .map_err(|e| RecognitionError::Unavailable(e.to_string()))
///     }
/// }
/// ```
pub trait Recognizer: Send + Sync + 'static {
    /// Returns a short text guess of what the image shows.
    fn recognize(
        &self,
        image_data: &str,
    ) -> impl Future<Output = Result<String, RecognitionError>> + Send;
}

/// A recognizer that always answers with the same text.
///
/// Used when no vision backend is configured.
#[derive(Debug, Clone)]
pub struct StaticRecognizer {
    reply: String,
}

impl StaticRecognizer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for StaticRecognizer {
    fn default() -> Self {
        Self::new(FALLBACK_GUESS)
    }
}

impl Recognizer for StaticRecognizer {
    async fn recognize(&self, image_data: &str) -> Result<String, RecognitionError> {
        if image_data.trim().is_empty() {
            return Err(RecognitionError::EmptyImage);
        }
        Ok(self.reply.clone())
    }
}

/// Runs recognition in the background and delivers the guess to the
/// room. Failures are logged and produce no event.
pub(crate) fn spawn_recognition<R: Recognizer>(
    recognizer: Arc<R>,
    store: RoomStore,
    room_id: RoomId,
    image_data: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let guess = match recognizer.recognize(&image_data).await {
            Ok(guess) => guess,
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "recognition failed");
                return;
            }
        };
        if let Err(e) = store.submit_guess(&room_id, guess).await {
            tracing::debug!(%room_id, error = %e, "guess dropped");
        }
    })
}
