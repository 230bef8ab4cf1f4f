use crate::media::Sample;
use crate::transcribe::Transcriber;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Result of transcribing a single sample.
#[derive(Debug)]
struct SampleResult {
    index: usize,
    text: Option<String>,
    duration_ms: u64,
}

/// Statistics from the transcription process.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionStats {
    pub total_samples: usize,
    pub successful_samples: usize,
    pub failed_samples: usize,
    pub total_time: Duration,
}

/// Transcribes the samples of one job concurrently.
pub struct TranscriptionOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    concurrency: usize,
}

impl TranscriptionOrchestrator {
    pub fn new(transcriber: Arc<dyn Transcriber>, concurrency: usize) -> Self {
        Self {
            transcriber,
            concurrency: concurrency.max(1),
        }
    }

    /// Transcribe every sample and join the texts in sample order.
    ///
    /// Failed samples are logged and left out; the transcript may be empty.
    pub async fn transcribe_samples(&self, samples: &[Sample]) -> (String, TranscriptionStats) {
        if samples.is_empty() {
            return (String::new(), TranscriptionStats::default());
        }

        let total_samples = samples.len();
        let start_time = Instant::now();

        info!(
            "Transcribing {} samples with {} concurrent requests using {}",
            total_samples,
            self.concurrency,
            self.transcriber.name()
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for sample in samples {
            let sem = semaphore.clone();
            let transcriber = self.transcriber.clone();

            futures.push(async move {
                // The semaphore is never closed.
                let _permit = sem.acquire().await.ok();
                let sample_start = Instant::now();

                let result = transcriber.transcribe(&sample.data, Sample::MIME_TYPE).await;
                let duration_ms = sample_start.elapsed().as_millis() as u64;

                match result {
                    Ok(text) => {
                        debug!("Sample {} transcribed in {}ms", sample.index, duration_ms);
                        SampleResult {
                            index: sample.index,
                            text: Some(text),
                            duration_ms,
                        }
                    }
                    Err(e) => {
                        warn!("Transcription of sample {} failed: {}", sample.index, e);
                        SampleResult {
                            index: sample.index,
                            text: None,
                            duration_ms,
                        }
                    }
                }
            });
        }

        let mut results: Vec<SampleResult> = Vec::with_capacity(total_samples);
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        // Completion order is arbitrary; the transcript follows sample order.
        results.sort_by_key(|r| r.index);

        let successful_samples = results.iter().filter(|r| r.text.is_some()).count();
        let transcript = results
            .iter()
            .filter_map(|r| r.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let stats = TranscriptionStats {
            total_samples,
            successful_samples,
            failed_samples: total_samples - successful_samples,
            total_time: start_time.elapsed(),
        };

        info!(
            "Transcription complete: {}/{} samples successful in {:.2}s (slowest {}ms)",
            stats.successful_samples,
            stats.total_samples,
            stats.total_time.as_secs_f64(),
            results.iter().map(|r| r.duration_ms).max().unwrap_or(0)
        );

        (transcript, stats)
    }
}
