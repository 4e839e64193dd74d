//! Storage key scheme.
//!
//! A field lives at `"{contract}.{field}"`; global fields use an empty
//! contract prefix (`".{field}"`). Collections extend their base key:
//! entries as `base<key>`, list elements as `base<u64 big-endian index>`,
//! and element counts at `base{count}`. Nothing else is persisted, so any
//! key can be recomputed from the contract and field names alone.

pub const FIELD_SEPARATOR: u8 = b'.';
const ENTRY_OPEN: u8 = b'<';
const ENTRY_CLOSE: u8 = b'>';
const COUNT_SUFFIX: &[u8] = b"{count}";

/// Field and collection names may not contain the collection delimiters
/// `<`, `>`, `{` or `}`; such a name would alias entries of another field.
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .bytes()
            .any(|b| matches!(b, ENTRY_OPEN | ENTRY_CLOSE | b'{' | b'}'))
}

/// Key of `field` in `contract`'s namespace.
pub fn field_key(contract: &str, field: &str) -> Vec<u8> {
    let mut key = contract_prefix(contract);
    key.extend_from_slice(field.as_bytes());
    key
}

/// Key of a field outside any contract.
pub fn global_key(field: &str) -> Vec<u8> {
    field_key("", field)
}

/// Prefix shared by every key of `contract`.
pub fn contract_prefix(contract: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(contract.len() + 1);
    key.extend_from_slice(contract.as_bytes());
    key.push(FIELD_SEPARATOR);
    key
}

/// Map entry key.
pub fn entry_key(base: &[u8], entry: &[u8]) -> Vec<u8> {
    let mut key = entries_prefix(base);
    key.extend_from_slice(entry);
    key.push(ENTRY_CLOSE);
    key
}

/// List element key.
pub fn index_key(base: &[u8], index: u64) -> Vec<u8> {
    entry_key(base, &index.to_be_bytes())
}

/// Prefix of every entry key under `base`.
pub fn entries_prefix(base: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(base.len() + 1);
    key.extend_from_slice(base);
    key.push(ENTRY_OPEN);
    key
}

/// Recovers the entry part of a key built by [`entry_key`].
pub fn split_entry<'a>(base: &[u8], key: &'a [u8]) -> Option<&'a [u8]> {
    key.strip_prefix(base)?
        .strip_prefix(&[ENTRY_OPEN])?
        .strip_suffix(&[ENTRY_CLOSE])
}

pub fn count_key(base: &[u8]) -> Vec<u8> {
    let mut key = base.to_vec();
    key.extend_from_slice(COUNT_SUFFIX);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys() {
        assert_eq!(field_key("token", "supply"), b"token.supply".to_vec());
        assert_eq!(global_key("nexus"), b".nexus".to_vec());
    }

    #[test]
    fn collection_keys() {
        let base = field_key("token", "balances");
        assert_eq!(entry_key(&base, b"alice"), b"token.balances<alice>".to_vec());
        assert_eq!(count_key(&base), b"token.balances{count}".to_vec());
        assert_eq!(
            index_key(&base, 2),
            [b"token.balances<".as_slice(), &[0, 0, 0, 0, 0, 0, 0, 2], b">"].concat()
        );
    }

    #[test]
    fn entries_round_trip() {
        let base = b"c.m".to_vec();
        let key = entry_key(&base, b"k>1");
        assert_eq!(split_entry(&base, &key), Some(b"k>1".as_slice()));
        assert_eq!(split_entry(&base, b"c.m{count}"), None);
    }

    #[test]
    fn delimiters_are_not_valid_in_field_names() {
        assert!(is_valid_field_name("balances"));
        assert!(is_valid_field_name("owner.name"));
        assert!(!is_valid_field_name(""));
        assert!(!is_valid_field_name("balances<alice>"));
        assert!(!is_valid_field_name("m<x"));
        assert!(!is_valid_field_name("balances{count}"));
    }

    #[test]
    fn index_keys_sort_numerically() {
        let base = b"l".to_vec();
        assert!(index_key(&base, 255) < index_key(&base, 256));
    }
}
