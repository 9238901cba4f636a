// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dalledress::{GenerationError, GenerationKey, Generator, ResilientCall};
use inflight::{Phase, ProgressHandle};
use tally::MetricsCollector;
use tick::Clock;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Where generated artifacts live: `<data_dir>/output/<series>/annotated/<address>.png`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Stores artifacts below `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: data_dir.as_ref().join("output"),
        }
    }

    /// The path of the artifact for `key`, whether or not it exists.
    #[must_use]
    pub fn path(&self, key: &GenerationKey) -> PathBuf {
        self.output_dir
            .join(key.series())
            .join("annotated")
            .join(format!("{}.png", key.address()))
    }

    /// Returns `true` if the artifact for `key` exists.
    #[must_use]
    pub fn exists(&self, key: &GenerationKey) -> bool {
        self.path(key).is_file()
    }

    /// Writes the artifact for `key`, creating directories as needed, and returns its path.
    ///
    /// # Errors
    ///
    /// Returns the I/O error together with the path it occurred on.
    pub async fn write(&self, key: &GenerationKey, contents: Vec<u8>) -> Result<PathBuf, (PathBuf, io::Error)> {
        let path = self.path(key);
        if let Some(parent) = path.parent()
            && let Err(error) = tokio::fs::create_dir_all(parent).await
        {
            return Err((path, error));
        }
        match tokio::fs::write(&path, contents).await {
            Ok(()) => Ok(path),
            Err(error) => Err((path, error)),
        }
    }

    /// Deletes the artifact for `key`. Returns its path if there was one.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the artifact exists but cannot be removed.
    pub async fn remove(&self, key: &GenerationKey) -> io::Result<Option<PathBuf>> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(Some(path)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// A stand-in for a remote image generator.
///
/// Walks through the enhancing, generating and annotating phases, spending `step` in each on
/// the clock, and writes a placeholder image. Existing images are reported as cache hits.
///
/// Prompt enhancement is optional: it runs through its own [`ResilientCall`] and falls back to
/// the plain prompt when that call fails.
#[derive(Debug)]
pub struct SimulatedGenerator {
    artifacts: ArtifactStore,
    enhance: ResilientCall,
    collector: MetricsCollector,
    clock: Clock,
    step: Duration,
}

impl SimulatedGenerator {
    /// Creates a generator writing to `artifacts`.
    #[must_use]
    pub fn new(artifacts: ArtifactStore, enhance: ResilientCall, collector: MetricsCollector, clock: Clock) -> Self {
        Self {
            artifacts,
            enhance,
            collector,
            clock,
            step: Duration::from_millis(500),
        }
    }

    /// Sets how long each simulated step takes.
    #[must_use]
    pub const fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// The artifact store written to.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    async fn enhance_prompt(&self, key: &GenerationKey) -> String {
        let plain = format!("A portrait of {} in the style of the {} series", key.address(), key.series());

        self.enhance
            .call_or_degrade(
                |_attempt| {
                    let plain = plain.clone();
                    async move {
                        self.clock.delay(self.step).await;
                        Ok(format!("{plain}, richly detailed, soft lighting"))
                    }
                },
                plain.clone(),
            )
            .await
    }
}

impl Generator for SimulatedGenerator {
    fn lookup(&self, key: &GenerationKey) -> Option<String> {
        let path = self.artifacts.path(key);
        path.is_file().then(|| path.display().to_string())
    }

    async fn generate(&self, key: &GenerationKey, progress: &ProgressHandle) -> Result<String, GenerationError> {
        progress.set_phase(Phase::Enhancing);
        progress.set_eta(self.step * 3);
        let prompt = self.enhance_prompt(key).await;

        progress.set_phase(Phase::Generating);
        progress.set_eta(self.step * 2);
        self.clock.delay(self.step / 2).await;
        progress.set_percent(60.0);
        self.clock.delay(self.step / 2).await;

        progress.set_phase(Phase::Annotating);
        progress.set_eta(self.step);
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(prompt.as_bytes());

        let written = self.artifacts.write(key, image).await;
        self.collector.record_file_operation(written.is_ok());
        let path = written.map_err(|(path, source)| GenerationError::io("write", path, source))?;

        Ok(path.display().to_string())
    }
}
