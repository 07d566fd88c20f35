use super::{
    split_target, BackendError, EngineInfo, ImageBackend, LaunchSpec, LayerSpec, PulledImage,
};
use crate::recipe::ImageReference;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{
    CommitContainerOptions, CreateImageOptions, RemoveImageOptions, TagImageOptions,
};
use bollard::Docker;
use futures_util::StreamExt;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";
const CONTAINER_LOG_TARGET: &str = "webagent_image::container";

/// Where a container's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSink {
    /// Build steps: one tracing event per line
    Log,
    /// The launched app: raw bytes on this process's stdout and stderr
    Console,
}

/// Docker Engine API backend
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connects using `DOCKER_HOST` or the local socket.
    pub fn connect() -> Result<Self, BackendError> {
        if std::env::var_os("DOCKER_HOST").is_none() && !Path::new(DOCKER_SOCKET_PATH).exists() {
            debug!("Docker socket not found at {}", DOCKER_SOCKET_PATH);
            return Err(BackendError::Unavailable(format!(
                "Docker socket not found at {}",
                DOCKER_SOCKET_PATH
            )));
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn create_container(&self, config: Config<String>) -> Result<String, BackendError> {
        let name = format!("webagent-image-{}", Uuid::new_v4().simple());
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(engine_error)?;
        debug!(container = %name, id = %created.id, "Created container");
        Ok(created.id)
    }

    async fn remove_container(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            warn!(container = %id, "Failed to remove container: {}", e);
        }
    }

    /// Streams the container's output to `sink` until it closes.
    async fn follow_logs(&self, id: &str, sink: OutputSink) {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => match sink {
                    OutputSink::Log => {
                        let bytes = output.into_bytes();
                        for line in String::from_utf8_lossy(&bytes).lines() {
                            info!(target: CONTAINER_LOG_TARGET, "{}", line);
                        }
                    }
                    OutputSink::Console => {
                        if let Err(e) = write_console(output) {
                            warn!(container = %id, "Failed to forward output: {}", e);
                        }
                    }
                },
                Err(e) => {
                    warn!(container = %id, "Log stream interrupted: {}", e);
                    break;
                }
            }
        }
    }

    async fn wait_exit_code(&self, id: &str) -> Result<i64, BackendError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(engine_error(e)),
            None => Err(BackendError::Engine(format!(
                "wait on container {} ended without a status",
                id
            ))),
        }
    }

    async fn run_to_completion(&self, id: &str, sink: OutputSink) -> Result<i64, BackendError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_error)?;
        self.follow_logs(id, sink).await;
        self.wait_exit_code(id).await
    }

    async fn discard_image(&self, reference: &str) {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_image(reference, Some(options), None).await {
            warn!(image = %reference, "Failed to remove committed image: {}", e);
        }
    }

    async fn derive_in_container(
        &self,
        id: &str,
        spec: &LayerSpec,
    ) -> Result<String, BackendError> {
        if let Some(upload) = &spec.upload {
            debug!(dest = %upload.dest, bytes = upload.archive.len(), "Uploading archive");
            let options = UploadToContainerOptions {
                path: upload.dest.clone(),
                ..Default::default()
            };
            self.docker
                .upload_to_container(id, Some(options), upload.archive.clone().into())
                .await
                .map_err(engine_error)?;
        }

        if let Some(command) = &spec.command {
            let exit_code = self.run_to_completion(id, OutputSink::Log).await?;
            if exit_code != 0 {
                return Err(BackendError::CommandFailed {
                    command: command.join(" "),
                    exit_code,
                });
            }
        }

        let (repo, tag) = split_target(&spec.target)?;
        let options = CommitContainerOptions {
            container: id.to_string(),
            repo,
            tag,
            pause: true,
            ..Default::default()
        };
        self.docker
            .commit_container(options, image_config(spec))
            .await
            .map_err(engine_error)?;

        let inspect = async {
            let image = self.docker.inspect_image(&spec.target).await?;
            Ok::<_, DockerError>(image.id)
        };
        identify_committed(&spec.target, inspect, self.discard_image(&spec.target)).await
    }
}

/// Id of a freshly committed image. When it cannot be read the image is
/// discarded so no unreferenced target is left behind.
async fn identify_committed<I, D>(
    target: &str,
    inspect: I,
    discard: D,
) -> Result<String, BackendError>
where
    I: Future<Output = Result<Option<String>, DockerError>>,
    D: Future<Output = ()>,
{
    let error = match inspect.await {
        Ok(Some(id)) => return Ok(id),
        Ok(None) => BackendError::Engine(format!("committed image {} has no id", target)),
        Err(e) => engine_error(e),
    };
    discard.await;
    Err(error)
}

fn write_console(output: LogOutput) -> io::Result<()> {
    forward_output(output, &mut io::stdout().lock(), &mut io::stderr().lock())
}

/// Writes one chunk of container output to the matching stream.
fn forward_output(
    output: LogOutput,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> io::Result<()> {
    match output {
        LogOutput::StdErr { message } => {
            stderr.write_all(&message)?;
            stderr.flush()
        }
        other => {
            stdout.write_all(&other.into_bytes())?;
            stdout.flush()
        }
    }
}

/// Config recorded on the committed image
fn image_config(spec: &LayerSpec) -> Config<String> {
    Config {
        env: Some(spec.settings.env.clone()),
        working_dir: spec.settings.working_dir.clone(),
        cmd: spec.settings.cmd.clone(),
        ..Default::default()
    }
}

fn engine_error(e: DockerError) -> BackendError {
    BackendError::Engine(e.to_string())
}

fn is_not_found(e: &DockerError) -> bool {
    matches!(
        e,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ImageBackend for DockerBackend {
    async fn info(&self) -> Result<EngineInfo, BackendError> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(EngineInfo {
            version: version.version.unwrap_or_else(|| "unknown".to_string()),
            api_version: version.api_version.unwrap_or_else(|| "0.0".to_string()),
        })
    }

    async fn pull(&self, reference: &ImageReference) -> Result<PulledImage, BackendError> {
        let pull_error = |message: String| BackendError::Pull {
            reference: reference.to_string(),
            message,
        };

        let options = CreateImageOptions {
            from_image: reference.repository.clone(),
            tag: reference.pull_tag(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(|e| pull_error(e.to_string()))?;
            if let Some(status) = progress.status {
                debug!(image = %reference, "{}", status);
            }
        }

        let inspect = self
            .docker
            .inspect_image(&reference.to_string())
            .await
            .map_err(|e| pull_error(e.to_string()))?;
        let id = inspect
            .id
            .ok_or_else(|| pull_error("image has no id".to_string()))?;
        let env = inspect.config.and_then(|c| c.env).unwrap_or_default();

        info!(image = %reference, id = %id, "Pulled base image");
        Ok(PulledImage { id, env })
    }

    async fn apply(&self, from: &str, spec: &LayerSpec) -> Result<String, BackendError> {
        let config = Config {
            image: Some(from.to_string()),
            cmd: spec.command.clone(),
            env: Some(spec.settings.env.clone()),
            working_dir: spec.settings.working_dir.clone(),
            ..Default::default()
        };
        let id = self.create_container(config).await?;
        let result = self.derive_in_container(&id, spec).await;
        self.remove_container(&id).await;
        result
    }

    async fn tag(&self, image: &str, repository: &str, tag: &str) -> Result<(), BackendError> {
        let options = TagImageOptions {
            repo: repository.to_string(),
            tag: tag.to_string(),
        };
        self.docker
            .tag_image(image, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn remove_image(&self, reference: &str) -> Result<(), BackendError> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_image(reference, Some(options), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(BackendError::ImageNotFound(reference.to_string())),
            Err(e) => Err(engine_error(e)),
        }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, BackendError> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(engine_error(e)),
        }
    }

    async fn launch(&self, image: &str, spec: &LaunchSpec) -> Result<i64, BackendError> {
        let config = Config::<String> {
            image: Some(image.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        let id = self
            .docker
            .create_container(options, config)
            .await
            .map_err(engine_error)?
            .id;

        let result = tokio::select! {
            code = self.run_to_completion(&id, OutputSink::Console) => code,
            _ = tokio::signal::ctrl_c() => {
                warn!(container = %id, "Interrupted, stopping container");
                let options = StopContainerOptions {
                    t: spec.stop_timeout.as_secs() as i64,
                };
                match self.docker.stop_container(&id, Some(options)).await {
                    Ok(()) => self.wait_exit_code(&id).await,
                    Err(e) => Err(engine_error(e)),
                }
            }
        };

        if spec.remove {
            self.remove_container(&id).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageSettings;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_image_config_carries_settings() {
        let spec = LayerSpec {
            target: "webagent-image-build-1:07-entrypoint".to_string(),
            command: None,
            upload: None,
            settings: ImageSettings {
                working_dir: Some("/app".to_string()),
                env: vec!["PATH=/root/.local/bin:/usr/bin".to_string()],
                cmd: Some(vec!["poetry".to_string(), "run".to_string()]),
            },
        };
        let config = image_config(&spec);
        assert_eq!(config.working_dir.as_deref(), Some("/app"));
        assert_eq!(config.env, Some(spec.settings.env.clone()));
        assert_eq!(config.cmd, spec.settings.cmd);
        assert!(config.image.is_none());
    }

    #[test]
    fn test_not_found_detection() {
        let missing = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image".to_string(),
        };
        let conflict = DockerError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        };
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&conflict));
    }

    #[tokio::test]
    async fn test_unidentified_commit_is_discarded() {
        let discarded = AtomicBool::new(false);
        let result = identify_committed(
            "webagent-image-build-1:02-workspace",
            async { Ok::<_, DockerError>(None::<String>) },
            async { discarded.store(true, Ordering::SeqCst) },
        )
        .await;
        assert!(matches!(result, Err(BackendError::Engine(_))));
        assert!(discarded.load(Ordering::SeqCst));

        let discarded = AtomicBool::new(false);
        let result = identify_committed(
            "webagent-image-build-1:02-workspace",
            async {
                Err::<Option<String>, _>(DockerError::DockerResponseServerError {
                    status_code: 500,
                    message: "inspect failed".to_string(),
                })
            },
            async { discarded.store(true, Ordering::SeqCst) },
        )
        .await;
        assert!(matches!(result, Err(BackendError::Engine(_))));
        assert!(discarded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_identified_commit_is_kept() {
        let discarded = AtomicBool::new(false);
        let result = identify_committed(
            "webagent-image-build-1:02-workspace",
            async { Ok::<_, DockerError>(Some("sha256:abc".to_string())) },
            async { discarded.store(true, Ordering::SeqCst) },
        )
        .await;
        assert_eq!(result.unwrap(), "sha256:abc");
        assert!(!discarded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_forward_output_splits_streams() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let chunks = vec![
            LogOutput::StdOut {
                message: "hello\n".into(),
            },
            LogOutput::StdErr {
                message: "oops\n".into(),
            },
            LogOutput::StdOut {
                message: "bye\n".into(),
            },
        ];
        for chunk in chunks {
            forward_output(chunk, &mut stdout, &mut stderr).unwrap();
        }
        assert_eq!(stdout, b"hello\nbye\n");
        assert_eq!(stderr, b"oops\n");
    }

    #[tokio::test]
    async fn test_info_when_engine_present() {
        // Succeeds or reports unavailability depending on the host
        match DockerBackend::connect() {
            Ok(backend) => {
                let _ = backend.info().await;
            }
            Err(e) => assert!(matches!(e, BackendError::Unavailable(_))),
        }
    }
}
