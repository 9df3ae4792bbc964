//! Fractional order keys.
//!
//! Keys are base-62 strings compared lexicographically. A new key can always
//! be generated strictly between two existing keys, so inserting a block never
//! rewrites its neighbours.

/// Base-62 charset (0-9, A-Z, a-z), lexicographically ordered.
pub(crate) const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Key for the first block of an empty document.
pub(crate) const FIRST_KEY: &str = "V";

fn base62_index(c: u8) -> usize {
    BASE62.iter().position(|&b| b == c).unwrap_or(0)
}

/// Compute a key strictly between `a` and `b` (`a < b`; `""` sorts first).
///
/// Pass `b = None` for "after `a`, unbounded".
pub(crate) fn order_midpoint(a: &str, b: Option<&str>) -> String {
    let a = a.as_bytes();
    let mut upper = b.map(str::as_bytes);
    let mut out = Vec::with_capacity(a.len() + 1);

    for i in 0.. {
        let lo = a.get(i).map(|&c| base62_index(c)).unwrap_or(0);
        let hi = match upper {
            Some(b) => b.get(i).map(|&c| base62_index(c)).unwrap_or(BASE62.len()),
            None => BASE62.len(),
        };

        if lo + 1 < hi {
            out.push(BASE62[(lo + hi) / 2]);
            break;
        }
        out.push(BASE62[lo]);
        if lo < hi {
            // Prefix is now strictly below `b`; anything may follow.
            upper = None;
        }
    }

    out.into_iter().map(char::from).collect()
}
