//! Three-way patch fields
//!
//! Optional expense fields have three update states: leave unchanged, clear
//! to null, or set a new value. A plain `Option` cannot express all three,
//! so patch payloads use this explicit variant, decoded once at the API
//! boundary (missing field → `Keep`, JSON `null` → `Clear`, value → `Set`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field in an update payload: keep the current value, clear it, or set
/// a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Fallibly map the set value, preserving `Keep`/`Clear`.
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<Patch<U>, E> {
        Ok(match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(f(value)?),
        })
    }
}

impl<T: Clone> Patch<T> {
    /// Apply this patch to a target field in place.
    pub fn apply_to(&self, target: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *target = None,
            Patch::Set(value) => *target = Some(value.clone()),
        }
    }
}

// Missing fields never reach Deserialize (that is what #[serde(default)]
// is for), so only the null/value distinction is decoded here.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Patch::Clear,
            Some(value) => Patch::Set(value),
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(value) => serializer.serialize_some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Default)]
    struct Payload {
        #[serde(default)]
        vendor: Patch<String>,
        #[serde(default)]
        tax: Patch<String>,
    }

    #[test]
    fn test_missing_field_is_keep() {
        let payload: Payload = serde_json::from_str("{}").unwrap();
        assert!(payload.vendor.is_keep());
        assert!(payload.tax.is_keep());
    }

    #[test]
    fn test_null_is_clear() {
        let payload: Payload = serde_json::from_str(r#"{"vendor": null}"#).unwrap();
        assert_eq!(payload.vendor, Patch::Clear);
        assert!(payload.tax.is_keep());
    }

    #[test]
    fn test_value_is_set() {
        let payload: Payload = serde_json::from_str(r#"{"vendor": "ACME"}"#).unwrap();
        assert_eq!(payload.vendor, Patch::Set("ACME".to_string()));
    }

    #[test]
    fn test_apply_to() {
        let mut field = Some("old".to_string());
        Patch::Keep.apply_to(&mut field);
        assert_eq!(field.as_deref(), Some("old"));

        Patch::Set("new".to_string()).apply_to(&mut field);
        assert_eq!(field.as_deref(), Some("new"));

        Patch::<String>::Clear.apply_to(&mut field);
        assert_eq!(field, None);
    }

    #[test]
    fn test_try_map_propagates_error() {
        let patch: Patch<String> = Patch::Set("oops".to_string());
        let result: Result<Patch<i32>, String> = patch.try_map(|_| Err("bad".to_string()));
        assert!(result.is_err());

        let keep: Patch<String> = Patch::Keep;
        let mapped: Result<Patch<i32>, String> = keep.try_map(|_| Err("bad".to_string()));
        assert_eq!(mapped.unwrap(), Patch::Keep);
    }
}
