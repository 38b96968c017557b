//! Route uploads to a backend by the configuration's type tag.

use crate::BackendHandle;
use crate::backend::{LocalBackend, NasBackend, UploadStream};
use crate::error::{ErrorKind, Result};
use crate::models::{StorageConfig, StorageType};
use std::sync::Arc;
use tracing::instrument;

/// Selects one backend per call from [`StorageConfig::kind`].
///
/// The backends themselves are stateless, so a single dispatcher can serve
/// any number of configurations concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    local: BackendHandle,
    nas: BackendHandle,
    object: Option<BackendHandle>,
}

impl Dispatcher {
    /// Dispatcher wired to the real backends.
    ///
    /// Object storage is only available when the `s3` feature is enabled.
    pub fn new() -> Self {
        #[cfg(feature = "s3")]
        let object: Option<BackendHandle> = Some(Arc::new(crate::backend::S3Backend));
        #[cfg(not(feature = "s3"))]
        let object: Option<BackendHandle> = None;
        Self {
            local: Arc::new(LocalBackend),
            nas: Arc::new(NasBackend),
            object,
        }
    }

    /// Dispatcher with explicit backends, mainly so tests can inject mocks.
    ///
    /// Each backend must serve the storage type of the slot it is given.
    pub fn with_backends(local: BackendHandle, nas: BackendHandle, object: Option<BackendHandle>) -> Self {
        debug_assert_eq!(local.kind(), StorageType::Local, "backend in the local slot");
        debug_assert_eq!(nas.kind(), StorageType::Nas, "backend in the nas slot");
        if let Some(object) = &object {
            debug_assert_eq!(object.kind(), StorageType::ObjectStorage, "backend in the object-storage slot");
        }
        Self { local, nas, object }
    }

    /// Backend registered for `kind`.
    pub fn backend(&self, kind: StorageType) -> Result<&BackendHandle> {
        match kind {
            StorageType::Local => Ok(&self.local),
            StorageType::Nas => Ok(&self.nas),
            StorageType::ObjectStorage => match &self.object {
                Some(backend) => Ok(backend),
                None => exn::bail!(ErrorKind::DisabledType(kind.to_string())),
            },
        }
    }

    /// Upload `stream` as `file_name` to the destination described by
    /// `config`, returning the number of bytes written.
    ///
    /// An unrecognised type tag fails before any backend is touched.
    #[instrument(skip(self, stream, config), fields(storage = %config.name, kind = %config.kind))]
    pub async fn dispatch(&self, stream: UploadStream, file_name: &str, config: &StorageConfig) -> Result<u64> {
        let kind = config.storage_type()?;
        let backend = self.backend(kind)?;
        tracing::debug!(%kind, backend = %backend.kind(), "Dispatching upload");
        let written = backend.upload(stream, file_name, config).await?;
        tracing::info!(%kind, bytes = written, "Upload complete");
        Ok(written)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use rstest::rstest;

    struct Mocks {
        local: Arc<MockBackend>,
        nas: Arc<MockBackend>,
        object: Arc<MockBackend>,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                local: Arc::new(MockBackend::new(StorageType::Local)),
                nas: Arc::new(MockBackend::new(StorageType::Nas)),
                object: Arc::new(MockBackend::new(StorageType::ObjectStorage)),
            }
        }

        fn dispatcher(&self) -> Dispatcher {
            Dispatcher::with_backends(self.local.clone(), self.nas.clone(), Some(self.object.clone() as BackendHandle))
        }

        async fn counts(&self) -> (usize, usize, usize) {
            (
                self.local.upload_count().await,
                self.nas.upload_count().await,
                self.object.upload_count().await,
            )
        }
    }

    #[rstest]
    #[case("local", (1, 0, 0))]
    #[case("nas", (0, 1, 0))]
    #[case("sftp", (0, 1, 0))]
    #[case("object-storage", (0, 0, 1))]
    #[case("qiniu", (0, 0, 1))]
    #[case(" S3 ", (0, 0, 1))]
    #[tokio::test]
    async fn test_dispatch_routes_by_type(#[case] tag: &str, #[case] expected: (usize, usize, usize)) {
        let mocks = Mocks::new();
        let config = StorageConfig::new("target", tag);
        let data: &'static [u8] = b"payload";
        let written = mocks.dispatcher().dispatch(Box::new(data), "a.jpg", &config).await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(mocks.counts().await, expected);
    }

    #[tokio::test]
    async fn test_unknown_type_touches_no_backend() {
        let mocks = Mocks::new();
        let config = StorageConfig::new("target", "unknown");
        let data: &'static [u8] = b"payload";
        let err = mocks.dispatcher().dispatch(Box::new(data), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedType(tag) if tag == "unknown"));
        assert_eq!(mocks.counts().await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_missing_object_backend_is_disabled() {
        let mocks = Mocks::new();
        let dispatcher = Dispatcher::with_backends(mocks.local.clone(), mocks.nas.clone(), None);
        let config = StorageConfig::new("target", "s3");
        let data: &'static [u8] = b"payload";
        let err = dispatcher.dispatch(Box::new(data), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DisabledType(_)));
        assert_eq!(mocks.counts().await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let mocks = Mocks::new();
        let dispatcher = mocks.dispatcher();
        let config = StorageConfig::new("target", "local");
        let first: &'static [u8] = b"one";
        let second: &'static [u8] = b"two";
        dispatcher.dispatch(Box::new(first), "a.jpg", &config).await.unwrap();
        let err = dispatcher.dispatch(Box::new(second), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "backend in the nas slot")]
    fn test_with_backends_rejects_mismatched_slot() {
        let mocks = Mocks::new();
        Dispatcher::with_backends(mocks.local.clone(), mocks.object.clone(), None);
    }

    #[test]
    fn test_new_wires_backends_to_their_slots() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.backend(StorageType::Local).unwrap().kind(), StorageType::Local);
        assert_eq!(dispatcher.backend(StorageType::Nas).unwrap().kind(), StorageType::Nas);
        #[cfg(feature = "s3")]
        assert_eq!(dispatcher.backend(StorageType::ObjectStorage).unwrap().kind(), StorageType::ObjectStorage);
    }
}
