//! Binary content detection on a single read chunk.

/// Check whether a chunk of bytes looks like binary content.
///
/// A chunk is binary when it contains a NUL byte or a byte sequence that is
/// not well-formed UTF-8: stray continuation bytes, overlong encodings,
/// surrogates, or code points above U+10FFFF. A multi-byte sequence cut off
/// by the end of the chunk is accepted, since the next read may complete it.
pub fn looks_binary(buf: &[u8]) -> bool {
    if memchr::memchr(0, buf).is_some() {
        return true;
    }

    let len = buf.len();
    let mut i = 0;

    while i < len {
        let lead = buf[i];
        if lead < 0x80 {
            i += 1;
            continue;
        }

        // 0x80..=0xC1 is a stray continuation byte or an overlong 2-byte lead
        let extra = match lead {
            0xC2..=0xDF => 1,
            0xE0..=0xEF => 2,
            0xF0..=0xF4 => 3,
            _ => return true,
        };

        for j in 1..=extra {
            match buf.get(i + j) {
                None => return false,
                Some(b) if b & 0xC0 != 0x80 => return true,
                Some(_) => {}
            }
        }

        let second = buf[i + 1];
        let malformed = match lead {
            0xE0 => second < 0xA0,
            0xED => second > 0x9F,
            0xF0 => second < 0x90,
            0xF4 => second > 0x8F,
            _ => false,
        };
        if malformed {
            return true;
        }

        i += extra + 1;
    }

    false
}
