//! Optional DEFLATE framing of reply datagrams
//!
//! A compressed datagram is two zero bytes followed by a raw DEFLATE
//! stream. Tags are positive decimal numbers, so a plain reply can never
//! start with a zero byte.

use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};
use log::{trace, warn};
use std::borrow::Cow;
use std::io::{Read, Write};

const COMPRESSED_PREFIX: [u8; 2] = [0, 0];

/// Inflate `data` when it carries the compression prefix
///
/// Anything that fails to inflate is handed back unchanged; the reply
/// parser then reports the garbage rather than this layer.
pub fn decompress_if_needed(data: &[u8]) -> Cow<'_, [u8]> {
    if data.len() < 2 || data[..2] != COMPRESSED_PREFIX {
        return Cow::Borrowed(data);
    }

    let mut inflated = Vec::with_capacity(data.len() * 4);
    match DeflateDecoder::new(&data[2..]).read_to_end(&mut inflated) {
        Ok(_) => {
            trace!("Inflated {} bytes to {}", data.len(), inflated.len());
            Cow::Owned(inflated)
        }
        Err(e) => {
            warn!("Datagram has compression prefix but does not inflate: {e}");
            Cow::Borrowed(data)
        }
    }
}

/// Frame `data` the way the server does when compression is negotiated
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut output = COMPRESSED_PREFIX.to_vec();
    let mut encoder = DeflateEncoder::new(&mut output, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_reply_passes_through() {
        let reply = b"12 220 FILE\n1|2|3";
        assert!(matches!(decompress_if_needed(reply), Cow::Borrowed(_)));
        assert_eq!(decompress_if_needed(reply).as_ref(), reply);
        assert_eq!(decompress_if_needed(b"").as_ref(), b"");
        assert_eq!(decompress_if_needed(&[0]).as_ref(), &[0]);
    }

    #[test]
    fn test_garbage_after_prefix_fails_open() {
        let garbage = [0u8, 0, 0xFF, 0xFF, 0xFF, 0x13];
        assert_eq!(decompress_if_needed(&garbage).as_ref(), &garbage);
    }

    #[test]
    fn test_compressed_reply_inflates() {
        let reply = "7 230 ANIME\n18989|0|2025-2025|TV Series".repeat(10);
        let framed = compress(reply.as_bytes()).unwrap();
        assert_eq!(&framed[..2], &[0, 0]);
        assert!(framed.len() < reply.len());
        assert_eq!(decompress_if_needed(&framed).as_ref(), reply.as_bytes());
    }

    proptest! {
        #[test]
        fn prop_compress_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let framed = compress(&data).unwrap();
            let decompressed = decompress_if_needed(&framed);
            prop_assert_eq!(decompressed.as_ref(), data.as_slice());
        }
    }
}
