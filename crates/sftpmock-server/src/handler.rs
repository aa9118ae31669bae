//! SFTP request handling over a virtual filesystem.
//!
//! One [`SftpHandler`] serves one `sftp` subsystem channel. Handles are
//! local to the channel; the filesystem is shared by every session of the
//! same mock server.

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use sftpmock_vfs::{FsError, Metadata, VfsPath, VirtualFilesystem};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const FILE_MODE: u32 = 0o100_644;
const DIR_MODE: u32 = 0o040_755;

/// A virtual filesystem shared between the sessions of one server.
pub type SharedFilesystem = Arc<RwLock<VirtualFilesystem>>;

#[derive(Debug)]
enum OpenHandle {
    File { path: String, append: bool },
    Dir { path: String, listed: bool },
}

/// Answers SFTP requests from a [`SharedFilesystem`].
#[derive(Debug)]
pub struct SftpHandler {
    filesystem: SharedFilesystem,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpHandler {
    /// Creates a handler for one subsystem channel.
    #[must_use]
    pub fn new(filesystem: SharedFilesystem) -> Self {
        Self {
            filesystem,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn read_fs(&self) -> RwLockReadGuard<'_, VirtualFilesystem> {
        self.filesystem.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_fs(&self) -> RwLockWriteGuard<'_, VirtualFilesystem> {
        self.filesystem.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let name = self.next_handle.to_string();
        self.handles.insert(name.clone(), handle);
        name
    }

    fn file_handle(&self, handle: &str) -> Result<(&str, bool), StatusCode> {
        match self.handles.get(handle) {
            Some(OpenHandle::File { path, append }) => Ok((path, *append)),
            _ => Err(StatusCode::Failure),
        }
    }
}

fn status(id: u32, status_code: StatusCode, message: &str) -> Status {
    Status {
        id,
        status_code,
        error_message: message.to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn ok(id: u32) -> Status {
    status(id, StatusCode::Ok, "Ok")
}

fn attributes(metadata: Metadata) -> FileAttributes {
    FileAttributes {
        size: Some(metadata.size),
        permissions: Some(if metadata.kind.is_dir() {
            DIR_MODE
        } else {
            FILE_MODE
        }),
        ..FileAttributes::default()
    }
}

/// Maps a filesystem error to the status code sent to the client.
#[must_use]
pub fn status_code(error: &FsError) -> StatusCode {
    match error {
        FsError::NotFound { .. } => StatusCode::NoSuchFile,
        FsError::ReadOnly { .. } => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn fail(operation: &str, error: &FsError) -> StatusCode {
    debug!(operation, error = %error, "sftp request failed");
    status_code(error)
}

impl russh_sftp::server::Handler for SftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(version, "sftp session initialised");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = VfsPath::parse(&path).map_err(|e| fail("realpath", &e))?;
        Ok(Name {
            id,
            files: vec![File::dummy(resolved.as_str())],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        debug!(path = %path, "stat");
        let metadata = self.read_fs().stat(&path).map_err(|e| fail("stat", &e))?;
        Ok(Attrs {
            id,
            attrs: attributes(metadata),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        // no symlinks in a virtual tree
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let path = match self.handles.get(&handle) {
            Some(OpenHandle::File { path, .. } | OpenHandle::Dir { path, .. }) => path.clone(),
            None => return Err(StatusCode::Failure),
        };
        self.stat(id, path).await
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.read_fs().stat(&path).map_err(|e| fail("setstat", &e))?;
        Ok(ok(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        if self.handles.contains_key(&handle) {
            Ok(ok(id))
        } else {
            Err(StatusCode::Failure)
        }
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        debug!(path = %path, "opendir");
        self.read_fs().list(&path).map_err(|e| fail("opendir", &e))?;
        let handle = self.register(OpenHandle::Dir {
            path,
            listed: false,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            _ => return Err(StatusCode::Failure),
        };
        let entries = self.read_fs().list(&path).map_err(|e| fail("readdir", &e))?;
        Ok(Name {
            id,
            files: entries
                .into_iter()
                .map(|entry| File::new(entry.name, attributes(entry.metadata)))
                .collect(),
        })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        debug!(path = %filename, flags = ?pflags, "open");
        let writes = OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        if pflags.intersects(writes) {
            let mut fs = self.write_fs();
            let exists = fs.exists(&filename);
            if exists && pflags.contains(OpenFlags::CREATE | OpenFlags::EXCLUDE) {
                return Err(StatusCode::Failure);
            }
            if !exists && !pflags.contains(OpenFlags::CREATE) {
                return Err(StatusCode::NoSuchFile);
            }
            fs.create_file(&filename, pflags.contains(OpenFlags::TRUNCATE))
                .map_err(|e| fail("open", &e))?;
        } else {
            self.read_fs()
                .read_file(&filename)
                .map_err(|e| fail("open", &e))?;
        }
        let handle = self.register(OpenHandle::File {
            path: filename,
            append: pflags.contains(OpenFlags::APPEND),
        });
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let (path, _) = self.file_handle(&handle)?;
        let fs = self.read_fs();
        let content = fs.read_file(path).map_err(|e| fail("read", &e))?;
        let start = usize::try_from(offset).map_err(|_| StatusCode::Eof)?;
        if start >= content.len() {
            return Err(StatusCode::Eof);
        }
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        let end = content.len().min(start.saturating_add(len));
        Ok(Data {
            id,
            data: content[start..end].to_vec(),
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let (path, append) = self.file_handle(&handle)?;
        let mut fs = self.write_fs();
        let offset = if append {
            fs.stat(path).map_err(|e| fail("write", &e))?.size
        } else {
            offset
        };
        fs.write_at(path, offset, &data)
            .map_err(|e| fail("write", &e))?;
        Ok(ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(_) => Ok(ok(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        debug!(path = %filename, "remove");
        self.write_fs()
            .remove_file(&filename)
            .map_err(|e| fail("remove", &e))?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        debug!(path = %path, "mkdir");
        self.write_fs()
            .create_dir(&path)
            .map_err(|e| fail("mkdir", &e))?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        debug!(path = %path, "rmdir");
        self.write_fs()
            .remove_dir(&path)
            .map_err(|e| fail("rmdir", &e))?;
        Ok(ok(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        debug!(from = %oldpath, to = %newpath, "rename");
        self.write_fs()
            .rename(&oldpath, &newpath)
            .map_err(|e| fail("rename", &e))?;
        Ok(ok(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::server::Handler;
    use sftpmock_vfs::TreeBuilder;

    fn handler(writable: bool) -> SftpHandler {
        let tree = TreeBuilder::new()
            .dir("a_folder", |d| d.file("coisa.txt", "some text"))
            .dir("other_folder", |d| d)
            .build()
            .unwrap();
        let fs = VirtualFilesystem::new(tree).with_writable(writable);
        SftpHandler::new(Arc::new(RwLock::new(fs)))
    }

    #[tokio::test]
    async fn test_read_until_eof() {
        let mut h = handler(true);
        let handle = h
            .open(1, "/a_folder/coisa.txt".into(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = h.read(2, handle.clone(), 0, 4).await.unwrap();
        assert_eq!(data.data, b"some");
        let data = h.read(3, handle.clone(), 4, 100).await.unwrap();
        assert_eq!(data.data, b" text");
        assert!(matches!(
            h.read(4, handle.clone(), 9, 100).await.unwrap_err(),
            StatusCode::Eof
        ));
        assert!(matches!(
            h.close(5, handle).await.unwrap().status_code,
            StatusCode::Ok
        ));
    }

    #[tokio::test]
    async fn test_open_missing_is_no_such_file() {
        let mut h = handler(true);
        let err = h
            .open(1, "/a_folder/missing.txt".into(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StatusCode::NoSuchFile));
    }

    #[tokio::test]
    async fn test_readdir_single_batch() {
        let mut h = handler(true);
        let handle = h.opendir(1, "/".into()).await.unwrap().handle;
        let names: Vec<_> = h
            .readdir(2, handle.clone())
            .await
            .unwrap()
            .files
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, ["a_folder", "other_folder"]);
        assert!(matches!(h.readdir(3, handle).await.unwrap_err(), StatusCode::Eof));
    }

    #[tokio::test]
    async fn test_opendir_on_file_fails() {
        let mut h = handler(true);
        let err = h.opendir(1, "/a_folder/coisa.txt".into()).await.unwrap_err();
        assert!(matches!(err, StatusCode::Failure));
    }

    #[tokio::test]
    async fn test_upload_then_read_back() {
        let mut h = handler(true);
        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        let handle = h
            .open(1, "/other_folder/up.txt".into(), flags, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        h.write(2, handle.clone(), 0, b"uploaded".to_vec()).await.unwrap();
        h.close(3, handle).await.unwrap();

        let fs = h.read_fs();
        assert_eq!(fs.read_file("/other_folder/up.txt").unwrap(), b"uploaded");
    }

    #[tokio::test]
    async fn test_write_far_past_end_fails() {
        let mut h = handler(true);
        let flags = OpenFlags::WRITE | OpenFlags::CREATE;
        let handle = h
            .open(1, "/f".into(), flags, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let err = h
            .write(2, handle, u64::MAX - 1, b"abcdefgh".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, StatusCode::Failure));
        assert_eq!(h.read_fs().stat("/f").unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_read_only_denies_writes() {
        let mut h = handler(false);
        let flags = OpenFlags::WRITE | OpenFlags::CREATE;
        let err = h
            .open(1, "/new.txt".into(), flags, FileAttributes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StatusCode::PermissionDenied));
        let err = h.mkdir(2, "/x".into(), FileAttributes::default()).await.unwrap_err();
        assert!(matches!(err, StatusCode::PermissionDenied));
    }

    #[tokio::test]
    async fn test_stat_and_realpath() {
        let mut h = handler(true);
        let attrs = h.stat(1, "a_folder/coisa.txt".into()).await.unwrap().attrs;
        assert_eq!(attrs.size, Some(9));
        assert_eq!(attrs.permissions, Some(FILE_MODE));
        let name = h.realpath(2, "a_folder/../.".into()).await.unwrap();
        assert_eq!(name.files[0].filename, "/");
    }

    #[test]
    fn test_status_code_mapping() {
        let not_found = FsError::NotFound {
            path: "/x".to_string(),
        };
        assert!(matches!(status_code(&not_found), StatusCode::NoSuchFile));
        let read_only = FsError::ReadOnly {
            path: "/x".to_string(),
        };
        assert!(matches!(status_code(&read_only), StatusCode::PermissionDenied));
    }
}
