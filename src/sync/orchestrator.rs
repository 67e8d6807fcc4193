use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use super::{SyncPlan, SyncReport, Workspace};
use crate::config::{SyncConfig, SyncMode};
use crate::error::{RepoError, Result};
use crate::lease::Lease;
use crate::repo::{sha256_file, FileKind, RepoBuilder, RepoMerger, Snapshot};
use crate::sign::Signer;
use crate::store::{ObjectStore, RemoteObject};

/// Runs one rebuild or publish against a remote prefix
///
/// All collaborators are borrowed capabilities, so tests can drive the full
/// state machine with an in-memory store and fake tools.
pub struct SyncOrchestrator<'a> {
    store: &'a dyn ObjectStore,
    builder: &'a dyn RepoBuilder,
    merger: &'a dyn RepoMerger,
    signer: Option<&'a dyn Signer>,
    config: &'a SyncConfig,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        builder: &'a dyn RepoBuilder,
        merger: &'a dyn RepoMerger,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            store,
            builder,
            merger,
            signer: None,
            config,
        }
    }

    /// Signer used when the configuration asks for signing
    pub fn with_signer(mut self, signer: &'a dyn Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// The signer, only if signing is enabled for this run
    fn signer(&self) -> Option<&'a dyn Signer> {
        self.config.signing.as_ref().and(self.signer)
    }

    pub async fn run(&self) -> Result<SyncReport> {
        let started = Instant::now();
        self.config.validate()?;
        if self.config.signing.is_some() && self.signer.is_none() {
            return Err(RepoError::validation(
                "signing was requested but no signer is configured",
            ));
        }

        let prefix = &self.config.prefix;
        info!(
            bucket = self.store.bucket(),
            prefix = %prefix,
            rebuild = self.config.is_rebuild(),
            signing = self.config.signing.is_some(),
            "starting repository sync"
        );

        let lease = match &self.config.lease {
            Some(lease_config) => {
                Some(Lease::acquire(self.store, prefix, lease_config, Lease::new_owner()).await?)
            }
            None => None,
        };
        let workspace = match Workspace::create(&self.config.workspace) {
            Ok(workspace) => workspace,
            Err(e) => {
                if let Some(lease) = lease {
                    lease.release(self.store).await;
                }
                error!(category = %e.category(), error = %e, "repository sync failed");
                return Err(e);
            }
        };

        let mut report = SyncReport::new(self.store.bucket(), prefix.as_str());
        let outcome = match &self.config.mode {
            SyncMode::Rebuild => self.rebuild(&workspace, &mut report).await,
            SyncMode::Publish { packages } => {
                self.publish(packages, &workspace, &mut report).await
            }
        };

        if let Some(lease) = lease {
            lease.release(self.store).await;
        }
        report.workspace = workspace.finish();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(
                    plan = ?report.plan,
                    downloaded = report.downloaded,
                    uploaded = report.uploaded,
                    deleted = report.deleted,
                    elapsed_ms = report.elapsed_ms,
                    "repository sync complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(category = %e.category(), error = %e, "repository sync failed");
                Err(e)
            }
        }
    }

    async fn rebuild(&self, workspace: &Workspace, report: &mut SyncReport) -> Result<()> {
        let prefix = &self.config.prefix;
        let lease_key = Lease::key_for(prefix);

        info!(step = "list", scope = %prefix.scope(), "listing published repository");
        let objects: Vec<_> = self
            .list(&prefix.scope())
            .await?
            .into_iter()
            .filter(|o| o.key != lease_key)
            .collect();
        if objects.is_empty() {
            info!("nothing published under prefix, nothing to rebuild");
            report.plan = Some(SyncPlan::NothingToRebuild);
            return Ok(());
        }
        report.plan = Some(SyncPlan::Rebuild);

        let new = workspace.new_snapshot()?;
        info!(step = "download", objects = objects.len(), "downloading published repository");
        report.downloaded += self.download(&objects, &new).await?;

        if let Some(signer) = self.signer() {
            let catalog = new.catalog()?;
            info!(step = "sign-manifest", "re-signing catalog manifest");
            signer.sign_manifest(&catalog.manifest()).await?;
            report.manifest_signed = true;
        }

        let stale: Vec<String> = objects
            .iter()
            .filter(|o| prefix.contains_repodata(&o.key))
            .map(|o| o.key.clone())
            .collect();
        self.delete(stale, report).await;

        self.upload(&new, report).await
    }

    async fn publish(
        &self,
        packages: &[PathBuf],
        workspace: &Workspace,
        report: &mut SyncReport,
    ) -> Result<()> {
        let prefix = &self.config.prefix;

        let new = workspace.new_snapshot()?;
        info!(step = "stage", packages = packages.len(), "staging packages");
        for source in unique_by_name(packages) {
            let staged = new.add_package(source)?;
            debug!(source = %source.display(), staged = %staged.display(), "package staged");
            if let Some(signer) = self.signer() {
                signer.sign_package(&staged).await?;
                report.signed_packages += 1;
            }
        }

        info!(step = "build", "building catalog for new packages");
        let built = self.builder.build(&new).await?;

        info!(step = "list", scope = %prefix.repodata_scope(), "listing published catalog");
        let published: Vec<_> = self
            .list(&prefix.repodata_scope())
            .await?
            .into_iter()
            .filter(|o| prefix.contains_repodata(&o.key))
            .collect();

        if published.is_empty() {
            report.plan = Some(SyncPlan::FreshPublish);
            info!("no catalog published yet, uploading new repository");
            if let Some(signer) = self.signer() {
                info!(step = "sign-manifest", "signing catalog manifest");
                signer.sign_manifest(&built.manifest()).await?;
                report.manifest_signed = true;
            }
            return self.upload(&new, report).await;
        }

        report.plan = Some(SyncPlan::IncrementalPublish);
        let old = workspace.old_snapshot()?;
        info!(step = "download", objects = published.len(), "downloading published catalog");
        report.downloaded += self.download(&published, &old).await?;

        let merged = workspace.merged_snapshot()?;
        info!(step = "merge", "merging new packages into published catalog");
        let catalog = self.merger.merge(&old, &new, &merged).await?;

        if let Some(signer) = self.signer() {
            info!(step = "sign-manifest", "signing merged catalog manifest");
            signer.sign_manifest(&catalog.manifest()).await?;
            report.manifest_signed = true;
        }

        let stale = published.into_iter().map(|o| o.key).collect();
        self.delete(stale, report).await;

        self.upload(&merged, report).await
    }

    async fn list(&self, scope: &str) -> Result<Vec<RemoteObject>> {
        let objects = self
            .store
            .list(scope)
            .await
            .map_err(|e| RepoError::remote("list", scope, e))?;
        debug!(scope, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Fetch `objects` into `snapshot` at their prefix-relative paths
    async fn download(&self, objects: &[RemoteObject], snapshot: &Snapshot) -> Result<usize> {
        let prefix = &self.config.prefix;
        let mut targets = Vec::with_capacity(objects.len());
        for object in objects {
            // directory markers and the bare prefix carry no file
            let Some(relative) = prefix.strip(&object.key) else {
                continue;
            };
            if relative.ends_with('/') {
                continue;
            }
            targets.push((object.key.as_str(), snapshot.path_for(relative)?, object.size));
        }

        bounded(targets, self.config.concurrency, |(key, dest, size)| async move {
            self.store
                .get(key, &dest)
                .await
                .map_err(|e| RepoError::remote("get", key, e))?;
            debug!(key, dest = %dest.display(), size, "downloaded");
            Ok(())
        })
        .await
    }

    /// Upload every file of `snapshot`: packages, then catalog data, then
    /// the manifest and its signature.
    async fn upload(&self, snapshot: &Snapshot, report: &mut SyncReport) -> Result<()> {
        let prefix = &self.config.prefix;
        let visibility = self.config.visibility;
        let files = snapshot.files()?;
        info!(
            step = "upload",
            files = files.len(),
            visibility = %visibility,
            "uploading snapshot"
        );

        for kind in [FileKind::Package, FileKind::CatalogData, FileKind::Manifest] {
            let wave: Vec<_> = files
                .iter()
                .filter(|f| f.kind == kind)
                .map(|f| (prefix.key_for(&f.relative), f.path.clone()))
                .collect();
            if wave.is_empty() {
                continue;
            }
            // the signature must never land before the manifest it covers
            let limit = if kind == FileKind::Manifest {
                1
            } else {
                self.config.concurrency
            };
            report.uploaded += bounded(wave, limit, |(key, src)| async move {
                self.store
                    .put(&key, &src, visibility)
                    .await
                    .map_err(|e| RepoError::remote("put", &key, e))?;
                debug!(key = %key, src = %src.display(), "uploaded");
                Ok(())
            })
            .await?;
        }

        let manifest = snapshot.manifest_path();
        if manifest.is_file() {
            let digest = sha256_file(&manifest)?;
            info!(sha256 = %digest, "catalog manifest published");
            report.manifest_sha256 = Some(digest);
        }
        Ok(())
    }

    /// Remove `keys`; per-key failures are logged and recorded, not fatal
    async fn delete(&self, keys: Vec<String>, report: &mut SyncReport) {
        if keys.is_empty() {
            return;
        }
        info!(step = "delete", objects = keys.len(), "deleting published catalog");
        let outcome = self.store.delete_batch(&keys).await;
        for failure in &outcome.failures {
            warn!(key = %failure.key, error = %failure.message, "failed to delete object");
        }
        report.deleted += outcome.deleted.len();
        report.delete_failures.extend(outcome.failures);
    }
}

/// Run `op` over `items` with at most `limit` in flight, stopping at the
/// first error. Returns how many completed.
async fn bounded<T, F, Fut>(items: Vec<T>, limit: usize, op: F) -> Result<usize>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    stream::iter(items.into_iter().map(op))
        .buffer_unordered(limit.max(1))
        .try_fold(0usize, |done, ()| async move { Ok::<_, RepoError>(done + 1) })
        .await
}

/// Inputs deduplicated by file name, last occurrence winning, in the order
/// the winners were given
fn unique_by_name(packages: &[PathBuf]) -> Vec<&PathBuf> {
    let mut winner: HashMap<OsString, usize> = HashMap::new();
    for (index, package) in packages.iter().enumerate() {
        let Some(name) = package.file_name() else {
            continue;
        };
        if let Some(previous) = winner.insert(name.to_os_string(), index) {
            warn!(
                name = %name.to_string_lossy(),
                replaced = %packages[previous].display(),
                by = %package.display(),
                "duplicate package file name, later input wins"
            );
        }
    }
    packages
        .iter()
        .enumerate()
        .filter(|(index, package)| {
            package
                .file_name()
                .and_then(|name| winner.get(name))
                .is_some_and(|w| w == index)
        })
        .map(|(_, package)| package)
        .collect()
}
