use super::{
    BackendError, EngineInfo, ImageBackend, ImageSettings, LaunchSpec, LayerSpec, PulledImage,
};
use crate::recipe::ImageReference;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Mutex;

/// One engine call observed by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Pull {
        reference: String,
    },
    Apply {
        from: String,
        target: String,
        command: Option<Vec<String>>,
        upload_dest: Option<String>,
        settings: ImageSettings,
    },
    Tag {
        image: String,
        reference: String,
    },
    RemoveImage {
        reference: String,
    },
    Launch {
        image: String,
        cmd: Option<Vec<String>>,
    },
}

/// In-memory image as seen by the recording backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedImage {
    pub id: String,
    pub settings: ImageSettings,
    /// Absolute paths of every file uploaded into this image or its parents
    pub files: BTreeSet<String>,
    /// Commands run while building this image and its parents, in order
    pub history: Vec<Vec<String>>,
}

/// Backend double that keeps images in memory and records every call.
pub struct RecordingBackend {
    operations: Mutex<Vec<Operation>>,
    images: Mutex<BTreeMap<String, RecordedImage>>,
    base_env: Vec<String>,
    fail_pull: bool,
    failing_command: Option<(String, i64)>,
    tag_limit: Option<usize>,
    launch_exit_code: i64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(Vec::new()),
            images: Mutex::new(BTreeMap::new()),
            base_env: vec![
                "PATH=/usr/local/bin:/usr/local/sbin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
                "LANG=C.UTF-8".to_string(),
            ],
            fail_pull: false,
            failing_command: None,
            tag_limit: None,
            launch_exit_code: 0,
        }
    }

    /// Every pull fails as if the registry were unreachable.
    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    /// Commands containing `needle` exit with `exit_code`.
    pub fn failing_command(mut self, needle: impl Into<String>, exit_code: i64) -> Self {
        self.failing_command = Some((needle.into(), exit_code));
        self
    }

    /// Only the first `successes` tag calls succeed; later ones fail.
    pub fn failing_tag_after(mut self, successes: usize) -> Self {
        self.tag_limit = Some(successes);
        self
    }

    pub fn with_launch_exit_code(mut self, exit_code: i64) -> Self {
        self.launch_exit_code = exit_code;
        self
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.lock().unwrap().clone()
    }

    pub fn image(&self, reference: &str) -> Option<RecordedImage> {
        self.images.lock().unwrap().get(reference).cloned()
    }

    /// References currently present, sorted.
    pub fn references(&self) -> Vec<String> {
        self.images.lock().unwrap().keys().cloned().collect()
    }

    fn record(&self, operation: Operation) {
        self.operations.lock().unwrap().push(operation);
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn archive_files(archive: &[u8], dest: &str) -> Result<Vec<String>, BackendError> {
    let mut files = Vec::new();
    let mut reader = tar::Archive::new(archive);
    let entries = reader
        .entries()
        .map_err(|e| BackendError::Engine(format!("invalid upload archive: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| BackendError::Engine(format!("invalid upload archive: {}", e)))?;
        if entry.header().entry_type().is_file() {
            let path = entry
                .path()
                .map_err(|e| BackendError::Engine(e.to_string()))?
                .to_string_lossy()
                .to_string();
            // Drain so the next header is found
            let mut sink = Vec::new();
            entry
                .read_to_end(&mut sink)
                .map_err(|e| BackendError::Engine(e.to_string()))?;
            files.push(format!("{}/{}", dest.trim_end_matches('/'), path));
        }
    }
    Ok(files)
}

/// Content-addressed id: identical inputs always produce identical images.
fn derived_id(parent: &RecordedImage, spec: &LayerSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.id.as_bytes());
    if let Some(command) = &spec.command {
        hasher.update(command.join("\0").as_bytes());
    }
    if let Some(upload) = &spec.upload {
        hasher.update(upload.dest.as_bytes());
        hasher.update(&upload.archive);
    }
    hasher.update(format!("{:?}", spec.settings).as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl ImageBackend for RecordingBackend {
    async fn info(&self) -> Result<EngineInfo, BackendError> {
        Ok(EngineInfo {
            version: "recording".to_string(),
            api_version: "1.47".to_string(),
        })
    }

    async fn pull(&self, reference: &ImageReference) -> Result<PulledImage, BackendError> {
        let name = reference.to_string();
        self.record(Operation::Pull {
            reference: name.clone(),
        });
        if self.fail_pull {
            return Err(BackendError::Pull {
                reference: name,
                message: "registry unreachable".to_string(),
            });
        }

        let id = format!("sha256:{}", hex::encode(Sha256::digest(name.as_bytes())));
        let image = RecordedImage {
            id: id.clone(),
            settings: ImageSettings {
                working_dir: None,
                env: self.base_env.clone(),
                cmd: Some(vec!["python3".to_string()]),
            },
            ..Default::default()
        };
        self.images.lock().unwrap().insert(name, image);
        Ok(PulledImage {
            id,
            env: self.base_env.clone(),
        })
    }

    async fn apply(&self, from: &str, spec: &LayerSpec) -> Result<String, BackendError> {
        self.record(Operation::Apply {
            from: from.to_string(),
            target: spec.target.clone(),
            command: spec.command.clone(),
            upload_dest: spec.upload.as_ref().map(|u| u.dest.clone()),
            settings: spec.settings.clone(),
        });

        let parent = self
            .image(from)
            .ok_or_else(|| BackendError::ImageNotFound(from.to_string()))?;

        let mut image = RecordedImage {
            id: derived_id(&parent, spec),
            settings: spec.settings.clone(),
            files: parent.files.clone(),
            history: parent.history.clone(),
        };

        if let Some(upload) = &spec.upload {
            image
                .files
                .extend(archive_files(&upload.archive, &upload.dest)?);
        }

        if let Some(command) = &spec.command {
            let joined = command.join(" ");
            if let Some((needle, exit_code)) = &self.failing_command {
                if joined.contains(needle.as_str()) {
                    return Err(BackendError::CommandFailed {
                        command: joined,
                        exit_code: *exit_code,
                    });
                }
            }
            image.history.push(command.clone());
        }

        let id = image.id.clone();
        self.images
            .lock()
            .unwrap()
            .insert(spec.target.clone(), image);
        Ok(id)
    }

    async fn tag(&self, image: &str, repository: &str, tag: &str) -> Result<(), BackendError> {
        let reference = format!("{}:{}", repository, tag);
        let earlier = self
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::Tag { .. }))
            .count();
        self.record(Operation::Tag {
            image: image.to_string(),
            reference: reference.clone(),
        });
        if self.tag_limit.is_some_and(|limit| earlier >= limit) {
            return Err(BackendError::Engine(format!("cannot tag {}", reference)));
        }
        let mut images = self.images.lock().unwrap();
        let source = images
            .get(image)
            .cloned()
            .ok_or_else(|| BackendError::ImageNotFound(image.to_string()))?;
        images.insert(reference, source);
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<(), BackendError> {
        self.record(Operation::RemoveImage {
            reference: reference.to_string(),
        });
        self.images
            .lock()
            .unwrap()
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| BackendError::ImageNotFound(reference.to_string()))
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, BackendError> {
        Ok(self.images.lock().unwrap().contains_key(reference))
    }

    async fn launch(&self, image: &str, _spec: &LaunchSpec) -> Result<i64, BackendError> {
        let recorded = self
            .image(image)
            .ok_or_else(|| BackendError::ImageNotFound(image.to_string()))?;
        self.record(Operation::Launch {
            image: image.to_string(),
            cmd: recorded.settings.cmd.clone(),
        });
        Ok(self.launch_exit_code)
    }
}
