use crate::backend::Upload;
use crate::installer::fetch_verified;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use crate::source::single_file_archive;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{derive_layer, shell};

const INSTALLER_DIR: &str = "/tmp";

/// Installs the dependency manager and puts its directory first on PATH.
///
/// With a pinned checksum the installer is downloaded and verified on the
/// host, then uploaded; otherwise it is fetched inside the build container.
pub struct DependencyManagerStep;

#[async_trait]
impl BuildStep for DependencyManagerStep {
    fn kind(&self) -> StepKind {
        StepKind::DependencyManager
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let manager = context.recipe.dependency_manager.clone();

        let (script, upload) = match &manager.installer_sha256 {
            Some(expected) => {
                let data =
                    fetch_verified(context.fetcher.as_ref(), &manager.installer_url, expected)
                        .await?;
                let file_name = format!("{}-installer", manager.name);
                let archive = single_file_archive(&file_name, &data, 0o755)
                    .map_err(|e| StepError::InstallerFetch(e.to_string()))?;
                info!(
                    manager = %manager.name,
                    bytes = data.len(),
                    "Installer verified on host"
                );
                (
                    manager.install_from_file_script(),
                    Some(Upload {
                        archive,
                        dest: INSTALLER_DIR.to_string(),
                    }),
                )
            }
            None => {
                warn!(
                    manager = %manager.name,
                    url = %manager.installer_url,
                    "Installer is not pinned by checksum; running unverified remote script"
                );
                (manager.fetch_and_install_script(), None)
            }
        };

        let environment = context.environment.with_path_prepended(&manager.install_dir);
        let mut settings = context.image_settings(None);
        settings.env = environment.to_env_list();

        let output =
            derive_layer(context, self.kind(), Some(shell(script)), upload, settings).await?;
        context.environment = environment;

        info!(
            manager = %manager.name,
            path = context.environment.path(),
            "Dependency manager installed"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Operation, RecordingBackend};
    use crate::installer::{sha256_hex, StaticInstallerFetcher};
    use crate::pipeline::layer::ImageLayer;
    use crate::recipe::ImageRecipe;
    use std::sync::Arc;
    use tempfile::TempDir;

    const INSTALLER: &[u8] = b"print('installing poetry')\n";

    async fn context_at_step_four(
        backend: Arc<RecordingBackend>,
        recipe: ImageRecipe,
        dir: &TempDir,
    ) -> BuildContext {
        let mut context = BuildContext::new(
            backend.clone(),
            Arc::new(StaticInstallerFetcher::new(INSTALLER.to_vec())),
            recipe,
            dir.path(),
        )
        .unwrap();

        // Seed a parent layer so the step has something to derive from
        let base = context.recipe.base_reference().unwrap();
        let pulled = crate::backend::ImageBackend::pull(backend.as_ref(), &base)
            .await
            .unwrap();
        context.environment = crate::environment::BuildEnvironment::from_image_env(&pulled.env);
        for step in [
            StepKind::BaseRuntime,
            StepKind::Workspace,
            StepKind::SystemPackages,
        ] {
            context
                .layers
                .push(ImageLayer {
                    index: step.index(),
                    step,
                    reference: base.to_string(),
                    image_id: pulled.id.clone(),
                    changes_filesystem: true,
                    duration_ms: 0,
                })
                .unwrap();
        }
        context
    }

    fn last_apply(backend: &RecordingBackend) -> Operation {
        backend
            .operations()
            .into_iter()
            .rev()
            .find(|op| matches!(op, Operation::Apply { .. }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unpinned_installer_runs_in_container() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut context =
            context_at_step_four(backend.clone(), ImageRecipe::webagent(), &dir).await;
        let before = context.environment.clone();

        DependencyManagerStep.execute(&mut context).await.unwrap();

        match last_apply(&backend) {
            Operation::Apply {
                command,
                upload_dest,
                settings,
                ..
            } => {
                let command = command.unwrap();
                let script = &command[2];
                assert!(script.starts_with("curl -fsSL https://install.python-poetry.org"));
                assert!(upload_dest.is_none());
                assert!(settings
                    .env
                    .iter()
                    .any(|e| e.starts_with("PATH=/root/.local/bin:")));
            }
            other => panic!("unexpected operation: {other:?}"),
        }
        assert!(context.environment.path().starts_with("/root/.local/bin:"));
        assert!(!before.path().starts_with("/root/.local/bin"));
    }

    #[tokio::test]
    async fn test_pinned_installer_is_uploaded() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut recipe = ImageRecipe::webagent();
        recipe.dependency_manager.installer_sha256 = Some(sha256_hex(INSTALLER));
        let mut context = context_at_step_four(backend.clone(), recipe, &dir).await;

        let output = DependencyManagerStep.execute(&mut context).await.unwrap();

        match last_apply(&backend) {
            Operation::Apply {
                command,
                upload_dest,
                ..
            } => {
                let command = command.unwrap();
                let script = &command[2];
                assert!(!script.contains("curl"));
                assert!(script.starts_with("python3 /tmp/poetry-installer"));
                assert_eq!(upload_dest.as_deref(), Some("/tmp"));
            }
            other => panic!("unexpected operation: {other:?}"),
        }
        let image = backend.image(&output.reference).unwrap();
        assert!(image.files.contains("/tmp/poetry-installer"));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut recipe = ImageRecipe::webagent();
        recipe.dependency_manager.installer_sha256 = Some("0".repeat(64));
        let mut context = context_at_step_four(backend.clone(), recipe, &dir).await;
        let before = context.environment.clone();

        let result = DependencyManagerStep.execute(&mut context).await;
        assert!(matches!(result, Err(StepError::ChecksumMismatch { .. })));
        assert!(!backend
            .operations()
            .iter()
            .any(|op| matches!(op, Operation::Apply { .. })));
        assert_eq!(context.environment, before);
    }

    #[tokio::test]
    async fn test_failed_installer_keeps_environment() {
        let dir = TempDir::new().unwrap();
        let backend =
            Arc::new(RecordingBackend::new().failing_command("install.python-poetry.org", 7));
        let mut context =
            context_at_step_four(backend.clone(), ImageRecipe::webagent(), &dir).await;
        let before = context.environment.clone();

        let result = DependencyManagerStep.execute(&mut context).await;
        assert!(matches!(
            result,
            Err(StepError::CommandFailed { exit_code: 7, .. })
        ));
        assert_eq!(context.environment, before);
    }
}
