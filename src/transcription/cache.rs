//! # Speech Model Cache
//!
//! Keeps one loaded recognizer per model name for the life of the process.
//!
//! ## Loading:
//! The first request for a model triggers the load; requests arriving while
//! it is in progress wait on the same load instead of starting their own.
//! A failed load leaves the slot empty so the next request retries it.

use crate::transcription::engine::{RecognizerLoader, SpeechRecognizer, TranscriptionError};
use crate::transcription::model::SpeechModel;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type Slot = Arc<OnceCell<Arc<dyn SpeechRecognizer>>>;

pub struct SpeechModelCache {
    loader: Arc<dyn RecognizerLoader>,
    slots: Mutex<HashMap<SpeechModel, Slot>>,
}

impl SpeechModelCache {
    pub fn new(loader: Arc<dyn RecognizerLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the recognizer for `model`, loading it on first use.
    pub async fn get(&self, model: SpeechModel) -> Result<Arc<dyn SpeechRecognizer>, TranscriptionError> {
        // The map lock only covers slot lookup; the load itself runs outside it
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(model).or_default().clone()
        };

        let recognizer = slot
            .get_or_try_init(|| async {
                tracing::info!(model = %model, "Speech model not cached, loading");
                self.loader.load(model).await
            })
            .await?;

        Ok(recognizer.clone())
    }

    /// Models that finished loading, in allow-list order.
    pub async fn loaded_models(&self) -> Vec<SpeechModel> {
        let slots = self.slots.lock().await;
        SpeechModel::ALL
            .into_iter()
            .filter(|model| slots.get(model).is_some_and(|slot| slot.initialized()))
            .collect()
    }
}
