//! RFC 3986 percent-encoding for names carried over the wire.
//!
//! Grounded on the original `fileshare::Url::encode_string` /
//! `decode_string`: only the unreserved character set (letters, digits,
//! `-_.~`) passes through unescaped; everything else becomes `%XX` with
//! an uppercase hex pair. No pack repository depends on a dedicated
//! percent-encoding crate, so this is hand-rolled rather than imported.

const UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.~";

pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        if UNRESERVED.contains(byte) {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub fn decode(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s
                .get(i + 1..i + 3)
                .ok_or_else(|| format!("truncated percent-escape in {s:?}"))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| format!("invalid percent-escape %{hex} in {s:?}"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| format!("percent-decoded bytes are not valid UTF-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii_and_unicode() {
        for sample in ["hello world.txt", "naïve café", "a/b?c&d=e", "plain-ish_name.tar.gz"] {
            let encoded = encode(sample);
            assert_eq!(decode(&encoded).unwrap(), sample);
        }
    }

    #[test]
    fn unreserved_chars_pass_through_unescaped() {
        assert_eq!(encode("abc-1_2.3~4"), "abc-1_2.3~4");
    }

    #[test]
    fn rejects_truncated_escape() {
        assert!(decode("file%2").is_err());
    }
}
