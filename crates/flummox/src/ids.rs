//! Instance identifiers for action sets.

use uuid::Uuid;

/// A fresh base id for one action set instance.
///
/// Two instances built from the same declarations still get different action
/// ids because their base ids differ.
pub(crate) fn next_base_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Method names become part of an action id and a log line; keep them to
/// something a reader can type.
pub(crate) fn is_valid_method_name(method: &str) -> bool {
    let mut chars = method.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| next_base_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn method_names_must_be_identifiers() {
        assert!(is_valid_method_name("increment"));
        assert!(is_valid_method_name("_private2"));
        assert!(is_valid_method_name("getFoo"));
        assert!(!is_valid_method_name(""));
        assert!(!is_valid_method_name("2fast"));
        assert!(!is_valid_method_name("has-dash"));
        assert!(!is_valid_method_name("has space"));
    }
}
