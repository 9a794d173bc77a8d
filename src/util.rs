//! Small lexical helpers shared by the symbol file parsers.


// TODO: This is a copy of unstable `trim_ascii_start` from std. Once
//       stabilized, we should remove this functionality in favor of the std
//       version.
#[inline]
pub(crate) fn trim_ascii_start(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// TODO: This is a copy of unstable `trim_ascii_end` from std. Once stabilized,
//       we should remove this functionality in favor of the std version.
#[inline]
pub(crate) fn trim_ascii_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// TODO: This is a copy of unstable `trim_ascii` from std. Once stabilized,
//       we should remove this functionality in favor of the std version.
#[inline]
pub(crate) fn trim_ascii(bytes: &[u8]) -> &[u8] {
    trim_ascii_end(trim_ascii_start(bytes))
}


/// Split `data` into at most `max_tokens` tokens separated by any byte
/// out of `separators`.
///
/// Separator runs are collapsed and never produce empty tokens. The
/// last token captures the entire remainder of the input, which may
/// itself contain separator bytes. Callers that require an exact field
/// count check the length of the returned vector.
pub(crate) fn tokenize<'buf>(
    mut data: &'buf [u8],
    separators: &[u8],
    max_tokens: usize,
) -> Vec<&'buf [u8]> {
    let mut tokens = Vec::new();
    while tokens.len() < max_tokens {
        while let Some((first, rest)) = data.split_first() {
            if separators.contains(first) {
                data = rest;
            } else {
                break;
            }
        }
        if data.is_empty() {
            break;
        }

        if tokens.len() + 1 == max_tokens {
            // The final field takes the rest of the input verbatim.
            let () = tokens.push(data);
            break;
        }

        let end = data
            .iter()
            .position(|b| separators.contains(b))
            .unwrap_or(data.len());
        let () = tokens.push(&data[..end]);
        data = &data[end..];
        if !data.is_empty() {
            // Drop the separator terminating the token.
            data = &data[1..];
        }
    }
    tokens
}


/// Converts an ascii character to digit
fn ascii_to_hexdigit(character: u8) -> Option<u64> {
    match character {
        b'0'..=b'9' => Some(u64::from(character - b'0')),
        b'a'..=b'f' => Some(u64::from(character - b'a') + 10),
        b'A'..=b'F' => Some(u64::from(character - b'A') + 10),
        _ => None,
    }
}

/// Parse an entire token as an unprefixed hexadecimal number.
///
/// Unlike `u64::from_str_radix` this works directly on bytes. An empty
/// token or one containing a non-hex byte yields `None`; overly long
/// input wraps, mirroring the unchecked accumulation of `strtoull`.
pub(crate) fn from_radix_16(text: &[u8]) -> Option<u64> {
    if text.is_empty() {
        return None
    }

    let mut number = 0u64;
    for byte in text {
        let digit = ascii_to_hexdigit(*byte)?;
        number = number.wrapping_mul(16).wrapping_add(digit);
    }
    Some(number)
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Make sure that whitespace trimming behaves as in std.
    #[test]
    fn ascii_trimming() {
        assert_eq!(trim_ascii(b" \t xyz \r\n"), b"xyz");
        assert_eq!(trim_ascii(b"xyz"), b"xyz");
        assert_eq!(trim_ascii(b"  "), b"");
        assert_eq!(trim_ascii_start(b"  x "), b"x ");
        assert_eq!(trim_ascii_end(b" x  "), b" x");
    }

    /// Check basic properties of the bounded tokenizer: runs collapse,
    /// the last field takes the remainder, and missing fields simply
    /// yield fewer tokens.
    #[test]
    fn bounded_tokenization() {
        let tokens = tokenize(b"1000 10 42 7", b" ", 4);
        assert_eq!(tokens, vec![&b"1000"[..], &b"10"[..], &b"42"[..], &b"7"[..]]);

        // The name field may contain the separator.
        let tokens = tokenize(b"c184 30 0 operator()(int, int)", b" ", 4);
        assert_eq!(
            tokens,
            vec![
                &b"c184"[..],
                &b"30"[..],
                &b"0"[..],
                &b"operator()(int, int)"[..]
            ]
        );

        // Separator runs do not produce empty tokens.
        let tokens = tokenize(b"a##b#c", b"#", 3);
        assert_eq!(tokens, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

        // An empty remainder is simply absent.
        let tokens = tokenize(b"a b ", b" ", 3);
        assert_eq!(tokens, vec![&b"a"[..], &b"b"[..]]);

        assert_eq!(tokenize(b"", b" ", 2), Vec::<&[u8]>::new());
        assert_eq!(tokenize(b"x y z", b" ", 0), Vec::<&[u8]>::new());
    }

    /// Test the unbounded mode used for location expressions.
    #[test]
    fn unbounded_tokenization() {
        let tokens = tokenize(b"91:8$06", b"$", usize::MAX);
        assert_eq!(tokens, vec![&b"91:8"[..], &b"06"[..]]);

        assert_eq!(tokenize(b"$$$", b"$", usize::MAX), Vec::<&[u8]>::new());
    }

    /// Check our strict hexadecimal parser.
    #[test]
    fn hex_parsing() {
        assert_eq!(from_radix_16(b"0"), Some(0));
        assert_eq!(from_radix_16(b"deadBEEF"), Some(0xdeadbeef));
        assert_eq!(from_radix_16(b"ffffffffffffffff"), Some(u64::MAX));
        assert_eq!(from_radix_16(b""), None);
        assert_eq!(from_radix_16(b"12g4"), None);
        assert_eq!(from_radix_16(b"0x12"), None);
    }
}
