use core::cmp::Ordering;

use crate::header::KeyKind;

/// Dispatches key comparison by the database's configured `KeyKind`.
/// STRING/BYTES compare byte-wise over the full `key_size` (STRING keys are
/// NUL-padded so short strings still compare correctly against longer
/// ones); INT32/INT64 compare as native signed integers, not as bytes.
pub fn compare(kind: KeyKind, a: &[u8], b: &[u8]) -> Ordering {
    match kind {
        KeyKind::String | KeyKind::Bytes => a.cmp(b),
        KeyKind::Int32 => {
            let x = i32::from_ne_bytes(a.try_into().unwrap());
            let y = i32::from_ne_bytes(b.try_into().unwrap());
            x.cmp(&y)
        }
        KeyKind::Int64 => {
            let x = i64::from_ne_bytes(a.try_into().unwrap());
            let y = i64::from_ne_bytes(b.try_into().unwrap());
            x.cmp(&y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_compares_as_signed() {
        let neg = (-1i32).to_ne_bytes();
        let pos = 1i32.to_ne_bytes();
        assert_eq!(compare(KeyKind::Int32, &neg, &pos), Ordering::Less);
    }

    #[test]
    fn string_keys_compare_byte_wise_with_nul_padding() {
        let short = b"ab\0\0";
        let long = b"abc\0";
        assert_eq!(compare(KeyKind::String, short, long), Ordering::Less);
    }

    #[test]
    fn bytes_keys_compare_byte_wise() {
        let a = [1u8, 2, 3];
        let b = [1u8, 2, 4];
        assert_eq!(compare(KeyKind::Bytes, &a, &b), Ordering::Less);
    }
}
