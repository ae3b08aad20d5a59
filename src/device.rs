//! # Device Sync Module
//!
//! Questo modulo gestisce la sessione col dispositivo MTP: mount → mirror → unmount.
//!
//! ## Macchina a stati:
//! `Unmounted → Mounting → Mounted → Syncing → Unmounting → Unmounted`,
//! con `Error` raggiungibile da `Syncing` e `Unmounting`. Un mount fallito
//! riporta lo stato a `Unmounted`.
//!
//! ## Responsabilità:
//! - Mount su un mount point temporaneo legato al processo (`tempfile::TempDir`)
//! - Mirror dell'export tree con semantica delete-extraneous
//! - Unmount tentato sempre dopo un mount riuscito, anche se il mirror fallisce
//!   o viene interrotto
//! - Una sola sessione per `DeviceSyncer` (`&mut self` + controllo dello stato)
//!
//! ## Sicurezza:
//! - Se il dispositivo potrebbe essere ancora montato, la directory del mount
//!   point non viene mai rimossa ricorsivamente: resta su disco e viene loggata
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut device = DeviceSyncer::new(Arc::new(ExternalDevice::from_config(&config)), &config.mtp_target, reporter)?;
//! device.run_session(&config.output_directory, &shutdown).await?;
//! ```

use crate::config::Config;
use crate::error::SyncError;
use crate::logging::Reporter;
use crate::platform::{run_tool, OutputMode};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unmounted,
    Mounting,
    Mounted,
    Syncing,
    Unmounting,
    Error,
}

/// External helpers driving the device
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn mount(&self, mount_point: &Path) -> Result<(), SyncError>;

    /// Replicate `source` onto `destination`, deleting extraneous files there
    async fn mirror(&self, source: &Path, destination: &Path) -> Result<(), SyncError>;

    async fn unmount(&self, mount_point: &Path) -> Result<(), SyncError>;

    /// Programs that must be installed for a session
    fn programs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// simple-mtpfs + rsync + fusermount
pub struct ExternalDevice {
    mount_program: String,
    unmount_program: String,
    mirror_program: String,
}

impl ExternalDevice {
    pub fn new(
        mount_program: impl Into<String>,
        unmount_program: impl Into<String>,
        mirror_program: impl Into<String>,
    ) -> Self {
        Self {
            mount_program: mount_program.into(),
            unmount_program: unmount_program.into(),
            mirror_program: mirror_program.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tools.mount.clone(),
            config.tools.unmount.clone(),
            config.tools.mirror.clone(),
        )
    }
}

#[async_trait]
impl DeviceBackend for ExternalDevice {
    async fn mount(&self, mount_point: &Path) -> Result<(), SyncError> {
        run_tool(&self.mount_program, [mount_point.as_os_str()], OutputMode::Capture).await?;
        Ok(())
    }

    async fn mirror(&self, source: &Path, destination: &Path) -> Result<(), SyncError> {
        // trailing slash: copy the tree's content, not the directory itself
        let mut source_dir: OsString = source.as_os_str().to_owned();
        source_dir.push("/");
        let args: Vec<OsString> = vec![
            "-ruv".into(),
            "--delete".into(),
            "--progress".into(),
            source_dir,
            destination.as_os_str().to_owned(),
        ];
        run_tool(&self.mirror_program, args, OutputMode::Inherit).await?;
        Ok(())
    }

    async fn unmount(&self, mount_point: &Path) -> Result<(), SyncError> {
        let args: Vec<OsString> = vec!["-u".into(), mount_point.as_os_str().to_owned()];
        run_tool(&self.unmount_program, args, OutputMode::Capture).await?;
        Ok(())
    }

    fn programs(&self) -> Vec<String> {
        vec![
            self.mount_program.clone(),
            self.mirror_program.clone(),
            self.unmount_program.clone(),
        ]
    }
}

/// Owns the mount point and drives one device session
pub struct DeviceSyncer {
    backend: Arc<dyn DeviceBackend>,
    target: PathBuf,
    mount_dir: Option<TempDir>,
    mount_path: PathBuf,
    state: DeviceState,
    mounted: bool,
    reporter: Reporter,
}

impl DeviceSyncer {
    /// `target` is the device-side path, relative to the mount point
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        target: impl Into<PathBuf>,
        reporter: Reporter,
    ) -> Result<Self, SyncError> {
        let target = target.into();
        if !target
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SyncError::InvalidConfig(format!(
                "device target must be relative to the mount point: {}",
                target.display()
            )));
        }

        let mount_dir = tempfile::Builder::new()
            .prefix("mtpsync-")
            .tempdir()
            .map_err(|e| SyncError::io(std::env::temp_dir(), e))?;
        let mount_path = mount_dir.path().to_path_buf();

        Ok(Self {
            backend,
            target,
            mount_dir: Some(mount_dir),
            mount_path,
            state: DeviceState::Unmounted,
            mounted: false,
            reporter,
        })
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_path
    }

    /// Where the export tree lands on the device
    pub fn destination(&self) -> PathBuf {
        self.mount_path.join(&self.target)
    }

    pub async fn mount(&mut self) -> Result<(), SyncError> {
        self.reporter.info("Mounting mtp device...");
        self.state = DeviceState::Mounting;

        match self.backend.mount(&self.mount_path).await {
            Ok(()) => {
                self.mounted = true;
                self.state = DeviceState::Mounted;
                debug!("Device mounted on {}", self.mount_path.display());
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Unmounted;
                Err(SyncError::Mount(e.to_string()))
            }
        }
    }

    pub async fn sync_tracks(&mut self, export_dir: &Path) -> Result<(), SyncError> {
        if !self.mounted {
            return Err(SyncError::Mirror("device is not mounted".to_string()));
        }

        self.reporter.info("Syncing files...");
        self.state = DeviceState::Syncing;
        let destination = self.destination();

        match self.backend.mirror(export_dir, &destination).await {
            Ok(()) => {
                self.state = DeviceState::Mounted;
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Error;
                Err(SyncError::Mirror(e.to_string()))
            }
        }
    }

    pub async fn umount(&mut self) -> Result<(), SyncError> {
        if !self.mounted {
            return Ok(());
        }

        self.reporter.info("Unmounting mtp device...");
        self.state = DeviceState::Unmounting;

        match self.backend.unmount(&self.mount_path).await {
            Ok(()) => {
                self.mounted = false;
                self.state = DeviceState::Unmounted;
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Error;
                Err(SyncError::Unmount(e.to_string()))
            }
        }
    }

    /// Mount, mirror and always unmount once mounted.
    /// Returns the first failure; an unmount failure after a mirror failure is only reported.
    pub async fn run_session(
        &mut self,
        export_dir: &Path,
        shutdown: &CancellationToken,
    ) -> Result<(), SyncError> {
        if self.state != DeviceState::Unmounted || self.mounted {
            return Err(SyncError::SessionActive);
        }
        if shutdown.is_cancelled() {
            return Err(SyncError::Interrupted);
        }

        self.mount().await?;

        let mirrored = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(SyncError::Interrupted),
            result = self.sync_tracks(export_dir) => result,
        };
        if matches!(mirrored, Err(SyncError::Interrupted)) {
            self.state = DeviceState::Error;
            self.reporter.error("Got interrupted. Trying to clean up.");
        }

        let unmounted = self.umount().await;
        match (mirrored, unmounted) {
            (Ok(()), result) => result,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(unmount)) => {
                self.reporter.error(unmount.to_string());
                Err(e)
            }
        }
    }
}

impl Drop for DeviceSyncer {
    fn drop(&mut self) {
        if !self.mounted {
            return;
        }
        // never recurse into a live mount
        if let Some(dir) = self.mount_dir.take() {
            #[allow(deprecated)]
            let kept = dir.into_path();
            warn!(
                "Device may still be mounted on {}; unmount it manually",
                kept.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeDevice {
        fail_mount: bool,
        fail_mirror: bool,
        hang_mirror: bool,
        fail_unmount: bool,
        calls: Mutex<Vec<&'static str>>,
        mirrored_to: Mutex<Option<PathBuf>>,
    }

    impl FakeDevice {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn fail(what: &str) -> SyncError {
            SyncError::Tool {
                tool: what.to_string(),
                status: "exit status: 1".to_string(),
                output: format!("{} exploded", what),
            }
        }
    }

    #[async_trait]
    impl DeviceBackend for FakeDevice {
        async fn mount(&self, _mount_point: &Path) -> Result<(), SyncError> {
            self.calls.lock().unwrap().push("mount");
            if self.fail_mount {
                return Err(Self::fail("mount"));
            }
            Ok(())
        }

        async fn mirror(&self, _source: &Path, destination: &Path) -> Result<(), SyncError> {
            self.calls.lock().unwrap().push("mirror");
            *self.mirrored_to.lock().unwrap() = Some(destination.to_path_buf());
            if self.hang_mirror {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_mirror {
                return Err(Self::fail("mirror"));
            }
            Ok(())
        }

        async fn unmount(&self, _mount_point: &Path) -> Result<(), SyncError> {
            self.calls.lock().unwrap().push("unmount");
            if self.fail_unmount {
                return Err(Self::fail("unmount"));
            }
            Ok(())
        }
    }

    fn syncer(backend: Arc<FakeDevice>) -> DeviceSyncer {
        DeviceSyncer::new(backend, "Music", Reporter::quiet()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_session() {
        let backend = Arc::new(FakeDevice::default());
        let mut device = syncer(Arc::clone(&backend));
        let mount_point = device.mount_point().to_path_buf();

        device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["mount", "mirror", "unmount"]);
        assert_eq!(device.state(), DeviceState::Unmounted);
        assert!(!device.is_mounted());
        assert_eq!(
            backend.mirrored_to.lock().unwrap().clone(),
            Some(mount_point.join("Music"))
        );

        drop(device);
        assert!(!mount_point.exists());
    }

    #[tokio::test]
    async fn test_mount_failure_skips_everything_else() {
        let backend = Arc::new(FakeDevice {
            fail_mount: true,
            ..Default::default()
        });
        let mut device = syncer(Arc::clone(&backend));

        let err = device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Mount(ref m) if m.contains("mount exploded")));
        assert_eq!(backend.calls(), vec!["mount"]);
        assert_eq!(device.state(), DeviceState::Unmounted);
    }

    #[tokio::test]
    async fn test_mirror_failure_still_unmounts_once() {
        let backend = Arc::new(FakeDevice {
            fail_mirror: true,
            ..Default::default()
        });
        let mut device = syncer(Arc::clone(&backend));

        let err = device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Mirror(_)));
        let calls = backend.calls();
        assert_eq!(calls, vec!["mount", "mirror", "unmount"]);
        assert_eq!(calls.iter().filter(|c| **c == "unmount").count(), 1);
        assert_eq!(device.state(), DeviceState::Unmounted);
    }

    #[tokio::test]
    async fn test_unmount_failure_keeps_mount_point() {
        let backend = Arc::new(FakeDevice {
            fail_unmount: true,
            ..Default::default()
        });
        let mut device = syncer(Arc::clone(&backend));
        let mount_point = device.mount_point().to_path_buf();

        let err = device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unmount(_)));
        assert_eq!(device.state(), DeviceState::Error);
        assert!(device.is_mounted());

        // no second session while the device may still be mounted
        let again = device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(again, SyncError::SessionActive));
        assert_eq!(backend.calls(), vec!["mount", "mirror", "unmount"]);

        drop(device);
        assert!(mount_point.exists());
        std::fs::remove_dir(&mount_point).unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_during_mirror_unmounts() {
        let backend = Arc::new(FakeDevice {
            hang_mirror: true,
            ..Default::default()
        });
        let mut device = syncer(Arc::clone(&backend));
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = device
            .run_session(Path::new("/export"), &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Interrupted));
        assert_eq!(backend.calls(), vec!["mount", "mirror", "unmount"]);
        assert!(!device.is_mounted());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_touches_nothing() {
        let backend = Arc::new(FakeDevice::default());
        let mut device = syncer(Arc::clone(&backend));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = device
            .run_session(Path::new("/export"), &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Interrupted));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_target_cannot_escape_mount_point() {
        for target in ["../../home/me", "/Music", "Music/../.."] {
            let backend = Arc::new(FakeDevice::default());
            let err = DeviceSyncer::new(backend, target, Reporter::quiet()).err().unwrap();
            assert!(matches!(err, SyncError::InvalidConfig(_)));
        }

        let device = syncer(Arc::new(FakeDevice::default()));
        assert!(device.destination().starts_with(device.mount_point()));
    }

    #[tokio::test]
    async fn test_sync_requires_mount() {
        let backend = Arc::new(FakeDevice::default());
        let mut device = syncer(Arc::clone(&backend));
        assert!(device.sync_tracks(Path::new("/export")).await.is_err());
        assert!(device.umount().await.is_ok());
        assert!(backend.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_device_with_stand_in_programs() {
        let ok = Arc::new(ExternalDevice::new("true", "true", "true"));
        let mut device = DeviceSyncer::new(ok, "Music", Reporter::quiet()).unwrap();
        device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap();

        let broken = Arc::new(ExternalDevice::new("false", "true", "true"));
        assert_eq!(broken.programs(), vec!["false", "true", "true"]);
        let mut device = DeviceSyncer::new(broken, "Music", Reporter::quiet()).unwrap();
        let err = device
            .run_session(Path::new("/export"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Mount(_)));
    }
}
