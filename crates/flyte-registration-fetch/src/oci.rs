//! OCI registry retrieval strategy
//!
//! Pulls a tagged artifact from `registry/uri:version` into a staging
//! directory private to the pass, writing every layer that carries an
//! `org.opencontainers.image.title` annotation under that title. A workflow
//! package is expected to be exactly one such file, which is then moved to
//! `<scratch>/<uri>/<version>/<title>`.

use async_trait::async_trait;
use flyte_registration_core::{DownloadStrategy, RetrievalConfig};
use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::manifest::OciDescriptor;
use oci_client::secrets::RegistryAuth;
use oci_client::Reference;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::credentials::CredentialResolver;
use crate::error::{FetchError, FetchResult};
use crate::scratch;
use crate::ArtifactFetcher;

/// Layer annotation naming the file a layer is stored as
pub const IMAGE_TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Downloads workflow packages from an OCI registry
pub struct OciFetcher {
    config: Arc<RetrievalConfig>,
    credentials: CredentialResolver,
}

impl OciFetcher {
    pub fn new(config: Arc<RetrievalConfig>, credentials: CredentialResolver) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Reference to `uri:version` inside the configured registry
    pub fn reference(&self, uri: &str, version: &str) -> FetchResult<Reference> {
        let repository = uri.trim_matches('/');
        if repository.is_empty() || version.is_empty() {
            return Err(FetchError::InvalidArtifact(format!("{}:{}", uri, version)));
        }

        Ok(Reference::with_tag(
            self.config.oci.registry.clone(),
            repository.to_string(),
            version.to_string(),
        ))
    }

    /// A new client per download so no token cached by a previous pull is reused
    fn client(&self) -> oci_client::Client {
        let protocol = if self.config.oci.insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };

        oci_client::Client::new(ClientConfig {
            protocol,
            ..Default::default()
        })
    }

    /// Write every titled layer of the manifest into `dest`
    async fn copy(
        &self,
        client: &oci_client::Client,
        reference: &Reference,
        auth: &RegistryAuth,
        dest: &Path,
    ) -> FetchResult<usize> {
        let (manifest, digest) = client
            .pull_image_manifest(reference, auth)
            .await
            .map_err(|e| {
                FetchError::Registry(format!("failed to pull manifest for {}: {}", reference, e))
            })?;
        debug!(%digest, layers = manifest.layers.len(), "pulled manifest");

        let mut written = 0;
        for layer in &manifest.layers {
            let Some(title) = layer_title(layer) else {
                debug!(digest = %layer.digest, "skipping layer without title");
                continue;
            };
            let file_name = scratch::plain_component(title)?;
            let path = dest.join(file_name);

            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| FetchError::io("creating local file", e))?;
            client
                .pull_blob(reference, layer, &mut file)
                .await
                .map_err(|e| {
                    FetchError::Registry(format!(
                        "failed to copy layer {} from remote: {}",
                        layer.digest, e
                    ))
                })?;
            file.flush()
                .await
                .map_err(|e| FetchError::io("closing local file", e))?;
            written += 1;
        }

        Ok(written)
    }
}

#[async_trait]
impl ArtifactFetcher for OciFetcher {
    #[instrument(skip(self, cancel), fields(strategy = "oci"))]
    async fn fetch(
        &self,
        uri: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<PathBuf> {
        info!(artifact = uri, version, "downloading artifact");

        let reference = self.reference(uri, version)?;
        let dest = scratch::artifact_dir(&self.config.scratch_dir, uri, version)?;

        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            credential = self.credentials.resolve(&self.config.oci) => credential?,
        };
        let auth = RegistryAuth::Basic(
            credential.username,
            credential.password.expose_secret().clone(),
        );

        let staging = scratch::staging_dir(&dest).await?;
        let client = self.client();
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.copy(&client, &reference, &auth, staging.path()) => result?,
        };
        debug!(files = written, dir = %staging.path().display(), "copied artifact layers");

        let staged = single_artifact(staging.path()).await?;
        let path = scratch::promote(&staged, &dest).await?;
        info!(artifact = uri, version, path = %path.display(), "downloaded artifact");
        Ok(path)
    }

    fn strategy(&self) -> DownloadStrategy {
        DownloadStrategy::Oci
    }
}

fn layer_title(layer: &OciDescriptor) -> Option<&str> {
    layer
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(IMAGE_TITLE_ANNOTATION))
        .map(String::as_str)
}

/// The single file in `dir`, failing when there are zero or several entries
pub async fn single_artifact(dir: &Path) -> FetchResult<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io("reading downloaded files", e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io("reading downloaded files", e))?
    {
        names.push(entry.file_name());
    }
    names.sort();

    if names.len() != 1 {
        for (i, name) in names.iter().enumerate() {
            warn!(
                file_number = i + 1,
                file_name = %name.to_string_lossy(),
                "too many files downloaded"
            );
        }
        return Err(FetchError::UnexpectedFileCount {
            dir: dir.to_path_buf(),
            count: names.len(),
        });
    }

    Ok(dir.join(&names[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthorizationTokenSource;
    use flyte_registration_core::{OciSettings, RegistryAuthStrategy};
    use secrecy::SecretString;
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
    const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

    struct NoTokens;

    #[async_trait]
    impl AuthorizationTokenSource for NoTokens {
        async fn authorization_tokens(&self) -> FetchResult<Vec<Option<String>>> {
            Ok(Vec::new())
        }
    }

    /// Token exchange that never answers
    struct HangingTokens;

    #[async_trait]
    impl AuthorizationTokenSource for HangingTokens {
        async fn authorization_tokens(&self) -> FetchResult<Vec<Option<String>>> {
            std::future::pending().await
        }
    }

    fn fetcher_with(
        registry: &str,
        scratch_dir: &Path,
        auth_strategy: RegistryAuthStrategy,
        tokens: Arc<dyn AuthorizationTokenSource>,
    ) -> OciFetcher {
        let config = RetrievalConfig {
            strategy: DownloadStrategy::Oci,
            oci: OciSettings {
                registry: registry.to_string(),
                auth_strategy,
                username: Some("user".to_string()),
                password: Some(SecretString::new("pass".to_string())),
                region: None,
                insecure: true,
            },
            scratch_dir: scratch_dir.to_path_buf(),
            ..Default::default()
        };
        OciFetcher::new(Arc::new(config), CredentialResolver::new(tokens))
    }

    fn fetcher(scratch_dir: &Path, auth_strategy: RegistryAuthStrategy) -> OciFetcher {
        fetcher_with("localhost:5000", scratch_dir, auth_strategy, Arc::new(NoTokens))
    }

    fn digest(data: &[u8]) -> String {
        format!("sha256:{:x}", Sha256::digest(data))
    }

    async fn registry() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    /// Serve `repository:tag` with one layer per `(title, contents)` pair
    async fn publish(
        server: &MockServer,
        repository: &str,
        tag: &str,
        layers: &[(Option<&str>, &[u8])],
        blob_delay: Duration,
    ) {
        let config = b"{}";
        let descriptors: Vec<_> = layers
            .iter()
            .map(|(title, data)| {
                let mut layer = json!({
                    "mediaType": LAYER_MEDIA_TYPE,
                    "digest": digest(data),
                    "size": data.len(),
                });
                if let Some(title) = title {
                    layer["annotations"] = json!({ "org.opencontainers.image.title": title });
                }
                layer
            })
            .collect();
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": digest(config),
                "size": config.len(),
            },
            "layers": descriptors,
        });

        Mock::given(method("GET"))
            .and(path(format!("/v2/{}/manifests/{}", repository, tag)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(serde_json::to_vec(&manifest).unwrap(), MANIFEST_MEDIA_TYPE),
            )
            .mount(server)
            .await;

        for (_, data) in layers {
            Mock::given(method("GET"))
                .and(path(format!("/v2/{}/blobs/{}", repository, digest(data))))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(data.to_vec())
                        .set_delay(blob_delay),
                )
                .mount(server)
                .await;
        }
    }

    async fn file_names(dir: &Path) -> Vec<String> {
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[test]
    fn test_reference_is_scoped_to_registry() {
        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher(scratch.path(), RegistryAuthStrategy::Static);

        let reference = fetcher.reference("team/workflows", "1.0.0").unwrap();
        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.repository(), "team/workflows");
        assert_eq!(reference.tag(), Some("1.0.0"));

        assert!(fetcher.reference("", "1.0.0").is_err());
        assert!(fetcher.reference("team/workflows", "").is_err());
    }

    #[test]
    fn test_layer_title() {
        let mut annotations = BTreeMap::new();
        annotations.insert(IMAGE_TITLE_ANNOTATION.to_string(), "pkg.tgz".to_string());
        let layer = |annotations| OciDescriptor {
            media_type: LAYER_MEDIA_TYPE.to_string(),
            digest: "sha256:0000".to_string(),
            size: 3,
            urls: None,
            annotations,
        };
        assert_eq!(layer_title(&layer(Some(annotations))), Some("pkg.tgz"));
        assert_eq!(layer_title(&layer(None)), None);
    }

    #[tokio::test]
    async fn test_single_artifact_returns_the_only_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("flyte-package.tgz"), b"tgz")
            .await
            .unwrap();

        let path = single_artifact(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("flyte-package.tgz"));
    }

    #[tokio::test]
    async fn test_single_artifact_rejects_several_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.tgz"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("b.tgz"), b"b").await.unwrap();

        let err = single_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedFileCount { count: 2, .. }));
        assert!(err.to_string().contains("got 2"));
    }

    #[tokio::test]
    async fn test_single_artifact_rejects_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = single_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedFileCount { count: 0, .. }));
    }

    #[tokio::test]
    async fn test_fetch_copies_the_titled_layer() {
        let server = registry().await;
        publish(
            &server,
            "team/pkg",
            "1.0.0",
            &[(Some("pkg.tgz"), b"workflow-archive")],
            Duration::ZERO,
        )
        .await;

        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            &server.address().to_string(),
            scratch.path(),
            RegistryAuthStrategy::Static,
            Arc::new(NoTokens),
        );
        let path = fetcher
            .fetch("team/pkg", "1.0.0", &CancellationToken::new())
            .await
            .unwrap();

        let dest = scratch.path().join("team").join("pkg").join("1.0.0");
        assert_eq!(path, dest.join("pkg.tgz"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"workflow-archive");
        // The staging directory is gone once the file is in place
        assert_eq!(file_names(&dest).await, vec!["pkg.tgz"]);
    }

    #[tokio::test]
    async fn test_untitled_layers_are_skipped() {
        let server = registry().await;
        publish(
            &server,
            "team/pkg",
            "1.0.0",
            &[(Some("pkg.tgz"), b"workflow-archive"), (None, b"build metadata")],
            Duration::ZERO,
        )
        .await;

        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            &server.address().to_string(),
            scratch.path(),
            RegistryAuthStrategy::Static,
            Arc::new(NoTokens),
        );
        let path = fetcher
            .fetch("team/pkg", "1.0.0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "pkg.tgz");
        assert_eq!(file_names(path.parent().unwrap()).await, vec!["pkg.tgz"]);
    }

    #[tokio::test]
    async fn test_several_titled_layers_are_rejected() {
        let server = registry().await;
        publish(
            &server,
            "team/pkg",
            "1.0.0",
            &[(Some("a.tgz"), b"first"), (Some("b.tgz"), b"second")],
            Duration::ZERO,
        )
        .await;

        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            &server.address().to_string(),
            scratch.path(),
            RegistryAuthStrategy::Static,
            Arc::new(NoTokens),
        );
        let err = fetcher
            .fetch("team/pkg", "1.0.0", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnexpectedFileCount { count: 2, .. }));
        let dest = scratch.path().join("team").join("pkg").join("1.0.0");
        assert!(file_names(&dest).await.is_empty());
    }

    #[tokio::test]
    async fn test_previous_download_is_purged() {
        let server = registry().await;
        publish(
            &server,
            "team/pkg",
            "1.0.0",
            &[(Some("pkg.tgz"), b"workflow-archive")],
            Duration::ZERO,
        )
        .await;

        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("team").join("pkg").join("1.0.0");
        tokio::fs::create_dir_all(&dest).await.unwrap();
        tokio::fs::write(dest.join("stale.tgz"), b"old").await.unwrap();

        let fetcher = fetcher_with(
            &server.address().to_string(),
            scratch.path(),
            RegistryAuthStrategy::Static,
            Arc::new(NoTokens),
        );
        fetcher
            .fetch("team/pkg", "1.0.0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(file_names(&dest).await, vec!["pkg.tgz"]);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_keep_their_own_artifacts() {
        let server = registry().await;
        publish(
            &server,
            "team-a/pkg",
            "1.0.0",
            &[(Some("pkg-a.tgz"), b"package a")],
            Duration::from_millis(400),
        )
        .await;
        publish(
            &server,
            "team-b/pkg",
            "2.0.0",
            &[(Some("pkg-b.tgz"), b"package b")],
            Duration::ZERO,
        )
        .await;

        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            &server.address().to_string(),
            scratch.path(),
            RegistryAuthStrategy::Static,
            Arc::new(NoTokens),
        );
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(fetcher.fetch("team-a/pkg", "1.0.0", &cancel), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fetcher.fetch("team-b/pkg", "2.0.0", &cancel).await
        });

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.file_name().unwrap(), "pkg-a.tgz");
        assert_eq!(b.file_name().unwrap(), "pkg-b.tgz");
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"package a");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"package b");
    }

    #[tokio::test]
    async fn test_credential_failure_aborts_before_touching_disk() {
        let scratch = tempfile::tempdir().unwrap();
        let stale = scratch.path().join("team").join("pkg").join("1.0.0");
        tokio::fs::create_dir_all(&stale).await.unwrap();
        tokio::fs::write(stale.join("old.tgz"), b"old").await.unwrap();

        let fetcher = fetcher(scratch.path(), RegistryAuthStrategy::Ecr);
        let err = fetcher
            .fetch("team/pkg", "1.0.0", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NoAuthorizationData));
        assert!(stale.join("old.tgz").exists());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_credential_exchange() {
        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(
            "localhost:5000",
            scratch.path(),
            RegistryAuthStrategy::Ecr,
            Arc::new(HangingTokens),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch("team/pkg", "1.0.0", &cancel),
        )
        .await
        .expect("fetch should stop once cancelled")
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!scratch.path().join("team").exists());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_returns_cancelled() {
        let scratch = tempfile::tempdir().unwrap();
        let fetcher = fetcher(scratch.path(), RegistryAuthStrategy::Static);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher.fetch("team/pkg", "1.0.0", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!scratch.path().join("team").exists());
    }
}
