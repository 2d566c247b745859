//! SWF container handling: locating and replacing the embedded `DoABC` tag.
//! Supporting I/O plumbing, not a core recognizer/rewriter.

use std::io::{Read, Write};

use crate::error::{Error, Result};

const FWS: [u8; 3] = *b"FWS";
const CWS: [u8; 3] = *b"CWS";
const ZWS: [u8; 3] = *b"ZWS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
  None,
  Zlib,
  Lzma,
}

pub struct Swf {
  compression: Compression,
  version: u8,
  /// Everything after the 8-byte signature+length header, decompressed.
  body: Vec<u8>,
  /// Byte range of the `DoABC` tag's payload within `body`, and whether it
  /// carried the `DoABC2`-style lazy-init name prefix.
  abc_tag: AbcTagLocation,
}

struct AbcTagLocation {
  tag_start: usize,
  header_len: usize,
  name_len: usize,
  payload_start: usize,
  payload_end: usize,
}

impl Swf {
  pub fn parse(data: &[u8]) -> Result<Swf> {
    if data.len() < 8 {
      return Err(Error::InvalidInput("file too small to be a SWF".into()));
    }
    let sig = [data[0], data[1], data[2]];
    let compression = if sig == FWS {
      Compression::None
    } else if sig == CWS {
      Compression::Zlib
    } else if sig == ZWS {
      Compression::Lzma
    } else {
      return Err(Error::InvalidInput(
        "missing FWS/CWS/ZWS signature".into(),
      ));
    };
    let version = data[3];

    let rest = &data[8..];
    let body = match compression {
      Compression::None => rest.to_vec(),
      Compression::Zlib => inflate_zlib(rest)?,
      Compression::Lzma => inflate_lzma(rest)?,
    };

    let abc_tag = find_doabc_tag(&body)?;

    Ok(Swf {
      compression,
      version,
      body,
      abc_tag,
    })
  }

  pub fn abc_bytes(&self) -> &[u8] {
    &self.body[self.abc_tag.payload_start..self.abc_tag.payload_end]
  }

  /// Replaces the `DoABC` payload and re-serializes the whole movie,
  /// recompressing with the original method.
  pub fn with_abc_bytes(&self, new_abc: &[u8]) -> Vec<u8> {
    let loc = &self.abc_tag;
    let mut new_body = Vec::with_capacity(self.body.len() + new_abc.len());
    new_body.extend_from_slice(&self.body[..loc.tag_start]);

    let payload_len = loc.name_len + new_abc.len();
    let tag_code = 82u16; // DoABC
    let long_header = payload_len >= 0x3F;
    if long_header {
      let tag_and_len: u16 = (tag_code << 6) | 0x3F;
      new_body.extend_from_slice(&tag_and_len.to_le_bytes());
      new_body.extend_from_slice(&(payload_len as u32).to_le_bytes());
    } else {
      let tag_and_len: u16 = (tag_code << 6) | (payload_len as u16);
      new_body.extend_from_slice(&tag_and_len.to_le_bytes());
    }
    new_body.extend_from_slice(&self.body[loc.tag_start + loc.header_len..loc.payload_start]);
    new_body.extend_from_slice(new_abc);
    new_body.extend_from_slice(&self.body[loc.payload_end..]);

    let mut out = Vec::with_capacity(new_body.len() + 8);
    let sig = match self.compression {
      Compression::None => FWS,
      Compression::Zlib => CWS,
      Compression::Lzma => ZWS,
    };
    out.extend_from_slice(&sig);
    out.push(self.version);
    let total_len = (new_body.len() + 8) as u32;
    out.extend_from_slice(&total_len.to_le_bytes());

    match self.compression {
      Compression::None => out.extend_from_slice(&new_body),
      Compression::Zlib => out.extend_from_slice(&deflate_zlib(&new_body)),
      Compression::Lzma => out.extend_from_slice(&deflate_lzma(&new_body)),
    }
    out
  }
}

fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
  let mut decoder = flate2::read::ZlibDecoder::new(data);
  let mut out = Vec::new();
  decoder
    .read_to_end(&mut out)
    .map_err(|e| Error::InvalidInput(format!("zlib decompression failed: {e}")))?;
  Ok(out)
}

fn deflate_zlib(data: &[u8]) -> Vec<u8> {
  let mut encoder =
    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
  encoder.write_all(data).expect("writing to a Vec cannot fail");
  encoder.finish().expect("writing to a Vec cannot fail")
}

fn inflate_lzma(data: &[u8]) -> Result<Vec<u8>> {
  // SWF's LZMA variant prefixes the standard header with a 4-byte
  // compressed-size field that lzma-rs doesn't expect; skip it.
  let payload = data.get(4..).unwrap_or(data);
  let mut out = Vec::new();
  lzma_rs::lzma_decompress(&mut std::io::Cursor::new(payload), &mut out)
    .map_err(|e| Error::InvalidInput(format!("lzma decompression failed: {e}")))?;
  Ok(out)
}

fn deflate_lzma(data: &[u8]) -> Vec<u8> {
  let mut compressed = Vec::new();
  lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut compressed)
    .expect("writing to a Vec cannot fail");
  let mut out = Vec::with_capacity(compressed.len() + 4);
  out.extend_from_slice(&(data.len() as u32).to_le_bytes());
  out.extend_from_slice(&compressed);
  out
}

/// Walks the SWF tag stream (skipping the rect/frame-rate/frame-count header)
/// looking for a `DoABC` (82) tag. `DoABC2`'s leading flags+name are treated
/// as part of the tag's fixed header and left untouched on rewrite.
fn find_doabc_tag(body: &[u8]) -> Result<AbcTagLocation> {
  let mut pos = skip_header(body)?;

  while pos + 2 <= body.len() {
    let tag_and_len = u16::from_le_bytes([body[pos], body[pos + 1]]);
    let tag_code = tag_and_len >> 6;
    let short_len = (tag_and_len & 0x3F) as usize;
    let (header_len, len) = if short_len == 0x3F {
      if pos + 6 > body.len() {
        return Err(Error::InvalidInput("truncated tag header".into()));
      }
      let long_len =
        u32::from_le_bytes([body[pos + 2], body[pos + 3], body[pos + 4], body[pos + 5]])
          as usize;
      (6, long_len)
    } else {
      (2, short_len)
    };

    let content_start = pos + header_len;
    let content_end = content_start + len;
    if content_end > body.len() {
      return Err(Error::InvalidInput("tag overruns end of file".into()));
    }

    if tag_code == 82 {
      // DoABC: u32 flags, null-terminated name, then the raw ABC bytes.
      let name_end = body[content_start + 4..content_end]
        .iter()
        .position(|&b| b == 0)
        .map(|p| content_start + 4 + p + 1)
        .ok_or_else(|| Error::InvalidInput("malformed DoABC tag name".into()))?;
      return Ok(AbcTagLocation {
        tag_start: pos,
        header_len,
        name_len: name_end - content_start,
        payload_start: name_end,
        payload_end: content_end,
      });
    }
    if tag_code == 0 {
      break; // End tag with no DoABC found.
    }
    pos = content_end;
  }

  Err(Error::InvalidInput(
    "no DoABC tag found (not an ActionScript 3 movie?)".into(),
  ))
}

fn skip_header(body: &[u8]) -> Result<usize> {
  if body.is_empty() {
    return Err(Error::InvalidInput("empty SWF body".into()));
  }
  let nbits = (body[0] >> 3) as usize;
  let total_bits = 5 + nbits * 4;
  let rect_bytes = (total_bits + 7) / 8;
  let header_end = rect_bytes + 4; // + frame rate (2) + frame count (2)
  if header_end > body.len() {
    return Err(Error::InvalidInput("truncated movie header".into()));
  }
  Ok(header_end)
}
