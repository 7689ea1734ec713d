// Flat in-memory file store for rvos
//
// One directory, fixed file and descriptor tables. Descriptors returned here
// are storage-level; processes see them through their own descriptor slots.
use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, info};

use crate::config::{MAX_FDS, MAX_FILENAME, MAX_FILES, MAX_FILESIZE};
use crate::error::{KernelError, KernelResult};

pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 1;
pub const O_RDWR: u32 = 2;
pub const O_ACCMODE: u32 = 3;
pub const O_CREAT: u32 = 0x100;
pub const O_TRUNC: u32 = 0x200;

/// Flags passed to `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn can_read(self) -> bool {
        self.0 & O_ACCMODE != O_WRONLY
    }

    pub fn can_write(self) -> bool {
        self.0 & O_ACCMODE != O_RDONLY
    }

    pub fn creates(self) -> bool {
        self.0 & O_CREAT != 0
    }

    pub fn truncates(self) -> bool {
        self.0 & O_TRUNC != 0
    }
}

#[derive(Debug)]
struct FileEntry {
    name: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct OpenFile {
    file: usize,
    flags: OpenFlags,
    offset: usize,
}

/// Stored names are cut to the same length lookups are, so an over-long path
/// still finds the file it created.
fn stored_name(path: &str) -> &str {
    let mut len = path.len().min(MAX_FILENAME - 1);
    while !path.is_char_boundary(len) {
        len -= 1;
    }
    &path[..len]
}

/// Flat file system service
pub struct FileSystemService {
    files: Vec<Option<FileEntry>>,
    descriptors: [Option<OpenFile>; MAX_FDS],
}

impl FileSystemService {
    pub fn new() -> Self {
        Self {
            files: (0..MAX_FILES).map(|_| None).collect(),
            descriptors: [None; MAX_FDS],
        }
    }

    /// Drop every file and descriptor.
    pub fn init(&mut self) {
        info!("Initializing filesystem...");
        self.files.iter_mut().for_each(|file| *file = None);
        self.descriptors = [None; MAX_FDS];
        info!("Filesystem initialized");
    }

    /// Open `path`, creating and truncating as `flags` ask.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> KernelResult<usize> {
        if path.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        let name = stored_name(path);

        let existing = self
            .files
            .iter()
            .position(|file| file.as_ref().is_some_and(|f| f.name == name));

        let index = match existing {
            Some(index) => index,
            None if flags.creates() => {
                let index = self
                    .files
                    .iter()
                    .position(Option::is_none)
                    .ok_or(KernelError::ResourceExhausted)?;
                self.files[index] = Some(FileEntry {
                    name: String::from(name),
                    data: Vec::new(),
                });
                debug!("fs: created '{}'", name);
                index
            }
            None => return Err(KernelError::NotFound),
        };

        if flags.truncates() {
            if let Some(file) = self.files[index].as_mut() {
                file.data.clear();
            }
        }

        let fd = self
            .descriptors
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::ResourceExhausted)?;
        self.descriptors[fd] = Some(OpenFile { file: index, flags, offset: 0 });
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        self.descriptors
            .get_mut(fd)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(KernelError::NotFound)
    }

    /// Read from the descriptor's offset, clamped to the bytes available.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let open = self
            .descriptors
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(KernelError::NotFound)?;
        if !open.flags.can_read() {
            return Err(KernelError::ModeMismatch);
        }
        let file = self.files[open.file].as_ref().ok_or(KernelError::NotFound)?;

        // Another descriptor may have truncated the file below our offset.
        let start = open.offset.min(file.data.len());
        let count = buf.len().min(file.data.len() - start);
        buf[..count].copy_from_slice(&file.data[start..start + count]);
        open.offset = start + count;
        Ok(count)
    }

    /// Write at the descriptor's offset, clamped to `MAX_FILESIZE`.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> KernelResult<usize> {
        let open = self
            .descriptors
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(KernelError::NotFound)?;
        if !open.flags.can_write() {
            return Err(KernelError::ModeMismatch);
        }
        let file = self.files[open.file].as_mut().ok_or(KernelError::NotFound)?;

        let count = buf.len().min(MAX_FILESIZE.saturating_sub(open.offset));
        let end = open.offset + count;
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[open.offset..end].copy_from_slice(&buf[..count]);
        open.offset = end;
        Ok(count)
    }

    /// Size of the file called `path`, if it exists.
    pub fn file_size(&self, path: &str) -> Option<usize> {
        let name = stored_name(path);
        self.files
            .iter()
            .flatten()
            .find(|file| file.name == name)
            .map(|file| file.data.len())
    }

    pub fn open_descriptors(&self) -> usize {
        self.descriptors.iter().flatten().count()
    }
}

impl Default for FileSystemService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(bits: u32) -> OpenFlags {
        OpenFlags::from_bits(bits)
    }

    #[test]
    fn open_missing_file_without_create_fails() {
        let mut fs = FileSystemService::new();
        assert_eq!(fs.open("/nope", flags(O_RDONLY)), Err(KernelError::NotFound));
        assert_eq!(fs.open_descriptors(), 0);
    }

    #[test]
    fn write_then_read_back_through_a_second_descriptor() {
        let mut fs = FileSystemService::new();
        let w = fs.open("/hello.txt", flags(O_WRONLY | O_CREAT)).unwrap();
        assert_eq!(fs.write(w, b"hello, world"), Ok(12));
        fs.close(w).unwrap();

        let r = fs.open("/hello.txt", flags(O_RDONLY)).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(r, &mut buf), Ok(5));
        assert_eq!(&buf, b"hello");
        let mut rest = [0u8; 32];
        assert_eq!(fs.read(r, &mut rest), Ok(7));
        assert_eq!(&rest[..7], b", world");
        assert_eq!(fs.read(r, &mut rest), Ok(0));
    }

    #[test]
    fn access_mode_is_enforced() {
        let mut fs = FileSystemService::new();
        let ro = fs.open("/f", flags(O_RDONLY | O_CREAT)).unwrap();
        assert_eq!(fs.write(ro, b"x"), Err(KernelError::ModeMismatch));

        let wo = fs.open("/f", flags(O_WRONLY)).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(fs.read(wo, &mut buf), Err(KernelError::ModeMismatch));

        let rw = fs.open("/f", flags(O_RDWR)).unwrap();
        assert_eq!(fs.write(rw, b"ab"), Ok(2));
        assert_eq!(fs.read(rw, &mut buf), Ok(0));
        assert_eq!(fs.file_size("/f"), Some(2));
    }

    #[test]
    fn truncate_discards_contents() {
        let mut fs = FileSystemService::new();
        let fd = fs.open("/log", flags(O_WRONLY | O_CREAT)).unwrap();
        fs.write(fd, b"old contents").unwrap();
        fs.open("/log", flags(O_WRONLY | O_TRUNC)).unwrap();
        assert_eq!(fs.file_size("/log"), Some(0));
    }

    #[test]
    fn read_after_truncate_through_another_descriptor_returns_nothing() {
        let mut fs = FileSystemService::new();
        let rw = fs.open("/shared", flags(O_RDWR | O_CREAT)).unwrap();
        assert_eq!(fs.write(rw, b"0123456789"), Ok(10));
        fs.open("/shared", flags(O_WRONLY | O_TRUNC)).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(fs.read(rw, &mut buf), Ok(0));

        // the stale offset was pulled back to the end of the file
        let w = fs.open("/shared", flags(O_WRONLY)).unwrap();
        fs.write(w, b"ab").unwrap();
        assert_eq!(fs.read(rw, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ab");
    }

    #[test]
    fn writes_stop_at_the_file_size_limit() {
        let mut fs = FileSystemService::new();
        let fd = fs.open("/big", flags(O_WRONLY | O_CREAT)).unwrap();
        let chunk = alloc::vec![0xAAu8; MAX_FILESIZE - 10];
        assert_eq!(fs.write(fd, &chunk), Ok(MAX_FILESIZE - 10));
        assert_eq!(fs.write(fd, &[1u8; 64]), Ok(10));
        assert_eq!(fs.write(fd, b"more"), Ok(0));
        assert_eq!(fs.file_size("/big"), Some(MAX_FILESIZE));
    }

    #[test]
    fn close_frees_the_descriptor_once() {
        let mut fs = FileSystemService::new();
        let fd = fs.open("/f", flags(O_RDWR | O_CREAT)).unwrap();
        assert_eq!(fs.close(fd), Ok(()));
        assert_eq!(fs.close(fd), Err(KernelError::NotFound));
        assert_eq!(fs.close(MAX_FDS + 3), Err(KernelError::NotFound));
        assert_eq!(fs.open("/f", flags(O_RDONLY)), Ok(fd));
    }

    #[test]
    fn tables_report_exhaustion() {
        let mut fs = FileSystemService::new();
        for i in 0..MAX_FILES {
            let fd = fs.open(&alloc::format!("/f{i}"), flags(O_CREAT)).unwrap();
            fs.close(fd).unwrap();
        }
        assert_eq!(fs.open("/one-too-many", flags(O_CREAT)), Err(KernelError::ResourceExhausted));

        for _ in 0..MAX_FDS {
            fs.open("/f0", flags(O_RDONLY)).unwrap();
        }
        assert_eq!(fs.open("/f0", flags(O_RDONLY)), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn over_long_names_still_resolve() {
        let mut fs = FileSystemService::new();
        let long = "x".repeat(MAX_FILENAME * 2);
        let fd = fs.open(&long, flags(O_RDWR | O_CREAT)).unwrap();
        fs.write(fd, b"1").unwrap();
        assert_eq!(fs.file_size(&long), Some(1));
        assert!(fs.open(&long, flags(O_RDONLY)).is_ok());
    }

    #[test]
    fn init_forgets_everything() {
        let mut fs = FileSystemService::new();
        fs.open("/f", flags(O_RDWR | O_CREAT)).unwrap();
        fs.init();
        assert_eq!(fs.open_descriptors(), 0);
        assert_eq!(fs.file_size("/f"), None);
    }
}
