use std::io::{self, Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CompressionCodec;
use crate::error::{StoreError, StoreResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const ZSTD_LEVEL: i32 = 3;
const CHUNK: usize = 64 * 1024;

/// Compress a whole payload in memory.
pub fn compress(codec: CompressionCodec, data: &[u8]) -> StoreResult<Vec<u8>> {
    match codec {
        CompressionCodec::Gzip => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| StoreError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| StoreError::Compression(e.to_string()))
        }
        CompressionCodec::Zstd => {
            zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| StoreError::Compression(e.to_string()))
        }
    }
}

/// Identify the codec of a compressed payload from its leading bytes.
pub fn sniff(head: &[u8]) -> Option<CompressionCodec> {
    if head.starts_with(&ZSTD_MAGIC) {
        Some(CompressionCodec::Zstd)
    } else if head.starts_with(&GZIP_MAGIC) {
        Some(CompressionCodec::Gzip)
    } else {
        None
    }
}

/// Decompress `src` into `sink`, detecting the codec from the stream.
///
/// Returns the number of decompressed bytes written.
pub fn decompress_to<R: Read>(mut src: R, sink: &mut dyn Write) -> StoreResult<u64> {
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        let n = src.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let stream = Cursor::new(head[..filled].to_vec()).chain(src);

    match sniff(&head[..filled]) {
        Some(CompressionCodec::Gzip) => pump(GzDecoder::new(stream), sink),
        Some(CompressionCodec::Zstd) => {
            let decoder = zstd::stream::read::Decoder::new(stream)
                .map_err(|e| StoreError::Decompression(e.to_string()))?;
            pump(decoder, sink)
        }
        None => Err(StoreError::Decompression(format!(
            "unrecognised compression header {:02x?}",
            &head[..filled]
        ))),
    }
}

/// Decompress a whole payload in memory.
pub fn decompress(data: &[u8]) -> StoreResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    decompress_to(data, &mut out)?;
    Ok(out)
}

/// Copy a decoder into a sink, keeping decode failures apart from sink
/// failures.
fn pump<R: Read>(mut decoder: R, sink: &mut dyn Write) -> StoreResult<u64> {
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::Decompression(e.to_string())),
        };
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}
