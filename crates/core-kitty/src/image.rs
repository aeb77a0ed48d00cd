//! Kitty image loader: chunked assembly of a transmitted
//! image, medium-specific ingestion (direct payload / file / temporary file
//! / POSIX shared memory), decompression and PNG decoding via injected
//! trait objects, and validation of the final decoded image.

use crate::command::{Command, Compression, Format, Medium, Payload};
use std::io::Read;
use std::path::{Path, PathBuf};

const MAX_TRANSFER_BYTES: usize = 400 * 1024 * 1024;
const MAX_DIMENSION: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("invalid data")]
    InvalidData,
    #[error("zlib decompression failed")]
    DecompressionFailed,
    #[error("width and height are required")]
    DimensionsRequired,
    #[error("width or height exceeds the maximum")]
    DimensionsTooLarge,
    #[error("file path too long")]
    FilePathTooLong,
    #[error("temporary file path is outside a known temp directory")]
    TemporaryFileNotInTempDir,
    #[error("unsupported pixel format")]
    UnsupportedFormat,
    #[error("unsupported transmission medium")]
    UnsupportedMedium,
    #[error("unsupported pixel depth")]
    UnsupportedDepth,
    #[error("internal error")]
    InternalError,
}

const MAX_PATH_LEN: usize = 4096;

/// Decodes a compressed byte stream. `zlib_deflate` is the only wire
/// compression the protocol defines today.
pub trait Decompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, LoadError>;
}

/// Decodes a complete PNG file into raw RGBA pixels plus dimensions.
pub trait PngDecoder {
    fn decode(&self, data: &[u8]) -> Result<(Vec<u8>, u32, u32), LoadError>;
}

/// `flate2`-backed [`Decompressor`]; the default used outside tests.
#[derive(Debug, Default)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, LoadError> {
        use flate2::read::ZlibDecoder;
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|_| LoadError::DecompressionFailed)?;
        Ok(out)
    }
}

/// `image`-crate-backed [`PngDecoder`]; the default used outside tests.
#[derive(Debug, Default)]
pub struct ImagePngDecoder;

impl PngDecoder for ImagePngDecoder {
    fn decode(&self, data: &[u8]) -> Result<(Vec<u8>, u32, u32), LoadError> {
        let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)
            .map_err(|_| LoadError::InvalidData)?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        Ok((rgba.into_raw(), w, h))
    }
}

/// A decoded, ready-to-store image. Guaranteed after [`LoadingImage::complete`]
/// to be in `rgb`/`rgba` format with `data.len() == width*height*bpp` exactly.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: u32,
    pub number: u32,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub compression: Compression,
    pub data: Vec<u8>,
    pub transmit_time: u64,
    pub implicit_id: bool,
}

impl Image {
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            Format::Rgb => 3,
            Format::Rgba | Format::Png => 4,
        }
    }

    /// Raw-data construction path (no loader, no medium I/O) used when an
    /// image is constructed directly from already-decoded pixels; lenient
    /// about the exact byte count (`>=` rather than `==`), matching Kitty's
    /// own self-test which supplies undersized buffers on purpose.
    pub fn from_raw(
        id: u32,
        number: u32,
        width: u32,
        height: u32,
        format: Format,
        data: Vec<u8>,
        transmit_time: u64,
    ) -> Result<Self, LoadError> {
        if width == 0 || height == 0 {
            return Err(LoadError::DimensionsRequired);
        }
        let bpp = format.bytes_per_pixel();
        let required = width as usize * height as usize * bpp;
        if data.len() < required {
            return Err(LoadError::InvalidData);
        }
        Ok(Image {
            id,
            number,
            width,
            height,
            format,
            compression: Compression::None,
            data,
            transmit_time,
            implicit_id: false,
        })
    }
}

/// An in-progress transmission: at most one may exist at a time (a second
/// `init` while one is pending replaces it outright, per the protocol's
/// no-cancellation-semantics rule).
#[derive(Debug)]
pub struct LoadingImage {
    id: u32,
    number: u32,
    width: u32,
    height: u32,
    format: Format,
    compression: Compression,
    medium: Medium,
    implicit_id: bool,
    buffer: Vec<u8>,
    more: bool,
}

fn is_forbidden_prefix(path: &Path) -> bool {
    const FORBIDDEN: [&str; 3] = ["/proc", "/sys", "/dev"];
    for prefix in FORBIDDEN {
        let prefix = Path::new(prefix);
        if !path.starts_with(prefix) {
            continue;
        }
        if prefix == Path::new("/dev") && path.starts_with(Path::new("/dev/shm")) {
            continue;
        }
        return true;
    }
    false
}

fn read_path_payload(
    path_bytes: &[u8],
    offset: u32,
    size: u32,
    is_temporary: bool,
) -> Result<Vec<u8>, LoadError> {
    if path_bytes.len() > MAX_PATH_LEN {
        return Err(LoadError::FilePathTooLong);
    }
    let path_str = std::str::from_utf8(path_bytes).map_err(|_| LoadError::InvalidData)?;
    let path = PathBuf::from(path_str);

    if is_forbidden_prefix(&path) {
        return Err(LoadError::InvalidData);
    }

    let canonical = path.canonicalize().map_err(|_| LoadError::InvalidData)?;
    if is_forbidden_prefix(&canonical) {
        return Err(LoadError::InvalidData);
    }

    if is_temporary {
        let tmp_dir = std::env::temp_dir();
        let tmp_canonical = tmp_dir.canonicalize().unwrap_or(tmp_dir);
        if !canonical.starts_with(&tmp_canonical) {
            return Err(LoadError::TemporaryFileNotInTempDir);
        }
    }

    let metadata = std::fs::metadata(&canonical).map_err(|_| LoadError::InvalidData)?;
    if !metadata.is_file() {
        return Err(LoadError::InvalidData);
    }

    use std::io::{Seek, SeekFrom};
    let mut file = std::fs::File::open(&canonical).map_err(|_| LoadError::InvalidData)?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|_| LoadError::InvalidData)?;
    }
    let want = if size == 0 {
        MAX_TRANSFER_BYTES
    } else {
        (size as usize).min(MAX_TRANSFER_BYTES)
    };
    let mut buf = vec![0u8; want];
    let read = file.read(&mut buf).map_err(|_| LoadError::InvalidData)?;
    buf.truncate(read);

    if is_temporary {
        let _ = std::fs::remove_file(&canonical);
    }

    Ok(buf)
}

#[cfg(unix)]
fn read_shared_memory(
    name_bytes: &[u8],
    offset: u32,
    size: u32,
    expected_size: Option<usize>,
) -> Result<Vec<u8>, LoadError> {
    use std::ffi::CString;

    let name = std::str::from_utf8(name_bytes).map_err(|_| LoadError::InvalidData)?;
    let cname = CString::new(name).map_err(|_| LoadError::InvalidData)?;

    // SAFETY: cname is a valid NUL-terminated C string for the lifetime of
    // this call; the returned descriptor is owned by this function and
    // closed on every exit path below.
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
    if fd < 0 {
        return Err(LoadError::InvalidData);
    }

    let result = (|| -> Result<Vec<u8>, LoadError> {
        // SAFETY: fd was just validated non-negative above.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is open and stat is a valid writable buffer of the
        // right layout for fstat.
        if unsafe { libc::fstat(fd, &mut stat) } != 0 {
            return Err(LoadError::InvalidData);
        }
        let shm_len = stat.st_size as usize;
        // PNG has no width/height-derived floor: `expected_size` is `None`
        // and the segment's own size is all there is to check against.
        if expected_size.is_some_and(|expected| shm_len < expected) {
            return Err(LoadError::InvalidData);
        }

        // SAFETY: fd is a valid open shm descriptor, shm_len was just read
        // from fstat on the same descriptor, and the mapping is dropped
        // (munmap'd) before this closure returns.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                shm_len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(LoadError::InvalidData);
        }

        // SAFETY: addr is a valid mapping of shm_len readable bytes; the
        // slice does not outlive this closure, where it is copied out.
        let mapped = unsafe { std::slice::from_raw_parts(addr as *const u8, shm_len) };
        let start = offset as usize;
        let want = if size == 0 {
            shm_len.saturating_sub(start)
        } else {
            size as usize
        };
        let end = (start + want).min(shm_len);
        let out = if start <= end {
            mapped[start..end].to_vec()
        } else {
            Vec::new()
        };

        // SAFETY: addr/shm_len are the exact mapping created above.
        unsafe {
            libc::munmap(addr, shm_len);
        }
        Ok(out)
    })();

    // SAFETY: fd is open and owned by this function.
    unsafe {
        libc::close(fd);
    }
    if result.is_ok() {
        // SAFETY: cname is the same name passed to shm_open above.
        unsafe {
            libc::shm_unlink(cname.as_ptr());
        }
    }
    result
}

#[cfg(not(unix))]
fn read_shared_memory(
    _name_bytes: &[u8],
    _offset: u32,
    _size: u32,
    _expected_size: Option<usize>,
) -> Result<Vec<u8>, LoadError> {
    Err(LoadError::UnsupportedMedium)
}

impl LoadingImage {
    /// Begin a new transmission from a `transmit`/`transmit_and_display`
    /// command, ingesting the first chunk according to its medium.
    pub fn init(next_implicit_id: u32, payload: &Payload) -> Result<Self, LoadError> {
        let id = if payload.image_id != 0 {
            payload.image_id
        } else {
            next_implicit_id
        };

        let mut loading = LoadingImage {
            id,
            number: payload.image_number,
            width: payload.width,
            height: payload.height,
            format: payload.format,
            compression: payload.compression,
            medium: payload.medium,
            implicit_id: payload.image_id == 0,
            buffer: Vec::new(),
            more: payload.more,
        };

        // PNG's compressed byte count bears no relation to width*height*bpp;
        // the width×height floor only applies to raw pixel formats. `None`
        // tells `read_shared_memory` to skip the floor check entirely.
        let expected_size = if payload.format == Format::Png {
            None
        } else {
            let bpp = payload.format.bytes_per_pixel();
            Some(payload.width as usize * payload.height as usize * bpp)
        };

        match payload.medium {
            Medium::Direct => {
                if payload.data.len() > MAX_TRANSFER_BYTES {
                    return Err(LoadError::InvalidData);
                }
                loading.buffer.extend_from_slice(&payload.data);
            }
            Medium::File => {
                loading.buffer =
                    read_path_payload(&payload.data, payload.offset, payload.size, false)?;
                loading.more = false;
            }
            Medium::TemporaryFile => {
                loading.buffer =
                    read_path_payload(&payload.data, payload.offset, payload.size, true)?;
                loading.more = false;
            }
            Medium::SharedMemory => {
                loading.buffer = read_shared_memory(
                    &payload.data,
                    payload.offset,
                    payload.size,
                    expected_size,
                )?;
                loading.more = false;
            }
        }

        Ok(loading)
    }

    pub fn is_complete_pending(&self) -> bool {
        !self.more
    }

    /// Append another chunk (only meaningful for the `direct` medium; other
    /// media deliver their whole payload on `init`).
    pub fn add_data(&mut self, payload: &Payload) -> Result<(), LoadError> {
        if matches!(self.medium, Medium::Direct) {
            if self.buffer.len() + payload.data.len() > MAX_TRANSFER_BYTES {
                return Err(LoadError::InvalidData);
            }
            self.buffer.extend_from_slice(&payload.data);
        }
        self.more = payload.more;
        Ok(())
    }

    /// Finish the transmission: decompress, decode PNG if needed, validate
    /// dimensions and final byte count, and stamp `transmit_time`.
    pub fn complete(
        self,
        transmit_time: u64,
        decompressor: &dyn Decompressor,
        png_decoder: &dyn PngDecoder,
    ) -> Result<Image, LoadError> {
        let mut data = match self.compression {
            Compression::None => self.buffer,
            Compression::ZlibDeflate => decompressor.decompress(&self.buffer)?,
        };

        let (mut width, mut height, format) = (self.width, self.height, self.format);

        if matches!(format, Format::Png) {
            let (rgba, w, h) = png_decoder.decode(&data)?;
            data = rgba;
            width = w;
            height = h;
        }

        if width == 0 || height == 0 {
            return Err(LoadError::DimensionsRequired);
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(LoadError::DimensionsTooLarge);
        }

        let final_format = if matches!(format, Format::Png) {
            Format::Rgba
        } else {
            format
        };
        let bpp = final_format.bytes_per_pixel();
        let required = width as usize * height as usize * bpp;
        if data.len() != required {
            return Err(LoadError::InvalidData);
        }

        Ok(Image {
            id: self.id,
            number: self.number,
            width,
            height,
            format: final_format,
            compression: Compression::None,
            data,
            transmit_time,
            implicit_id: self.implicit_id,
        })
    }
}

/// Convenience entry point mirroring how [`crate::command::Command`] feeds a
/// loader: handles `transmit`/`transmit_and_display` only (callers dispatch
/// other actions elsewhere).
pub fn ingest(
    next_implicit_id: u32,
    command: &Command,
) -> Result<Option<LoadingImage>, LoadError> {
    match command {
        Command::Transmit(p) | Command::TransmitAndDisplay(p) => {
            Ok(Some(LoadingImage::init(next_implicit_id, p)?))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandParser;

    struct PassthroughDecompressor;
    impl Decompressor for PassthroughDecompressor {
        fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, LoadError> {
            Ok(data.to_vec())
        }
    }

    struct StubPngDecoder;
    impl PngDecoder for StubPngDecoder {
        fn decode(&self, _data: &[u8]) -> Result<(Vec<u8>, u32, u32), LoadError> {
            Ok((vec![0u8; 2 * 2 * 4], 2, 2))
        }
    }

    #[test]
    fn direct_rgb_round_trips() {
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,a=t,t=d,f=24;AAA").unwrap();
        let loading = ingest(2_147_483_647, &cmd).unwrap().unwrap();
        let img = loading
            .complete(42, &PassthroughDecompressor, &StubPngDecoder)
            .unwrap();
        assert_eq!(img.id, 31);
        assert_eq!(img.width, 1);
        assert_eq!(img.height, 1);
        assert_eq!(img.data.len(), 3);
        assert_eq!(img.transmit_time, 42);
    }

    #[test]
    fn implicit_id_used_when_image_id_zero() {
        let cmd = CommandParser::parse(b"s=1,v=1,a=t,t=d,f=24;AAA").unwrap();
        let loading = ingest(2_147_483_647, &cmd).unwrap().unwrap();
        assert_eq!(loading.id, 2_147_483_647);
        assert!(loading.implicit_id);
    }

    #[test]
    fn png_path_replaces_dimensions_from_decoder() {
        let cmd = CommandParser::parse(b"i=5,s=1,v=1,a=t,t=d,f=100;ZmFrZQ").unwrap();
        let loading = ingest(1, &cmd).unwrap().unwrap();
        let img = loading
            .complete(1, &PassthroughDecompressor, &StubPngDecoder)
            .unwrap();
        assert_eq!(img.width, 2);
        assert_eq!(img.height, 2);
        assert_eq!(img.format, Format::Rgba);
        assert_eq!(img.data.len(), 16);
    }

    #[test]
    fn mismatched_data_length_is_rejected() {
        let cmd = CommandParser::parse(b"i=5,s=2,v=2,a=t,t=d,f=24;AAA").unwrap();
        let loading = ingest(1, &cmd).unwrap().unwrap();
        let err = loading
            .complete(1, &PassthroughDecompressor, &StubPngDecoder)
            .unwrap_err();
        assert_eq!(err, LoadError::InvalidData);
    }

    #[test]
    fn zero_dimensions_rejected() {
        let cmd = CommandParser::parse(b"i=5,s=0,v=0,a=t,t=d,f=24;").unwrap();
        let loading = ingest(1, &cmd).unwrap().unwrap();
        let err = loading
            .complete(1, &PassthroughDecompressor, &StubPngDecoder)
            .unwrap_err();
        assert_eq!(err, LoadError::DimensionsRequired);
    }

    #[test]
    fn from_raw_allows_oversized_buffer() {
        let img = Image::from_raw(1, 0, 2, 2, Format::Rgb, vec![0u8; 20], 0).unwrap();
        assert_eq!(img.data.len(), 20);
    }

    #[test]
    fn from_raw_rejects_undersized_buffer() {
        let err = Image::from_raw(1, 0, 2, 2, Format::Rgb, vec![0u8; 4], 0).unwrap_err();
        assert_eq!(err, LoadError::InvalidData);
    }

    #[test]
    fn forbidden_prefix_is_component_aware_not_textual() {
        // Lookalike paths that merely share a textual prefix must not be
        // rejected: "/proc"/"/sys"/"/dev" are path components, not substrings.
        assert!(!is_forbidden_prefix(Path::new("/development/x.png")));
        assert!(!is_forbidden_prefix(Path::new("/systemd/x.png")));
        assert!(!is_forbidden_prefix(Path::new("/devtools/x.png")));
    }

    #[test]
    fn forbidden_prefix_rejects_real_component_matches() {
        assert!(is_forbidden_prefix(Path::new("/proc/self/mem")));
        assert!(is_forbidden_prefix(Path::new("/sys/kernel")));
        assert!(is_forbidden_prefix(Path::new("/dev/mem")));
        assert!(!is_forbidden_prefix(Path::new("/dev/shm/kitty-img")));
    }
}
