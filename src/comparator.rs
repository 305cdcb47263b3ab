//! The whitespace-tolerant line comparator (spec §4.5).
//!
//! Two streams are equivalent iff, pairing their lines in order, every
//! corresponding pair canonicalises to the same string, and any tail of
//! unmatched lines in either stream canonicalises to empty lines only.

use std::io::BufRead;

const WHITES: [char; 3] = [' ', '\t', '\n'];

/// Strips leading/trailing whitespace and collapses interior runs of
/// `{space, tab, newline}` into a single space.
fn canonicalize(line: &str) -> String {
    line.split(WHITES.as_ref())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compares two byte streams line-by-line, ignoring repeated, leading, or
/// trailing whitespace within a line and trailing blank lines.
pub fn white_diff<A: BufRead, B: BufRead>(output: A, expected: B) -> anyhow::Result<bool> {
    let mut output_lines = output.lines();
    let mut expected_lines = expected.lines();

    loop {
        let out = output_lines.next().transpose()?;
        let res = expected_lines.next().transpose()?;

        match (out, res) {
            (None, None) => return Ok(true),
            (Some(out), None) => {
                if !canonicalize(&out).is_empty() {
                    return Ok(false);
                }
            }
            (None, Some(res)) => {
                if !canonicalize(&res).is_empty() {
                    return Ok(false);
                }
            }
            (Some(out), Some(res)) => {
                if canonicalize(&out) != canonicalize(&res) {
                    return Ok(false);
                }
            }
        }
    }
}

/// Convenience entry point over in-memory byte slices.
pub fn white_diff_bytes(output: &[u8], expected: &[u8]) -> anyhow::Result<bool> {
    white_diff(output, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflexive() {
        for s in ["7\n", "", "a b\tc\n\n\n", "no trailing newline"] {
            assert!(white_diff_bytes(s.as_bytes(), s.as_bytes()).unwrap());
        }
    }

    #[test]
    fn tolerates_whitespace_variation_and_trailing_blank_lines() {
        assert!(white_diff_bytes(b"7\n", b"  7\n\n").unwrap());
        assert!(white_diff_bytes(b"a  b   c\n", b"a b c").unwrap());
        assert!(white_diff_bytes(b"1 2 3\n4 5 6\n", b"1 2 3\n4 5 6\n\n\n").unwrap());
    }

    #[test]
    fn sensitive_to_non_whitespace_differences() {
        assert!(!white_diff_bytes(b"7\n", b"8\n").unwrap());
        assert!(!white_diff_bytes(b"hello world\n", b"hello wor1d\n").unwrap());
    }

    #[test]
    fn sensitive_to_line_order() {
        assert!(!white_diff_bytes(b"a\nb\n", b"b\na\n").unwrap());
    }

    #[test]
    fn non_empty_tail_fails() {
        assert!(!white_diff_bytes(b"1 2 3\n", b"1 2 3\n4\n").unwrap());
    }

    #[test]
    fn both_empty_is_equal() {
        assert!(white_diff_bytes(b"", b"").unwrap());
        assert!(white_diff_bytes(b"\n\n", b"").unwrap());
    }
}
