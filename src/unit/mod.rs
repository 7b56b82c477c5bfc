//! Data model for indexed code units.
//!
//! An indexed unit is one class or method: its source text, descriptive
//! metadata, and an accumulating set of classes known to depend on it. The
//! unit id is a deterministic function of the owning class and signature,
//! which is what makes re-indexing idempotent.

pub mod extractor;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use extractor::{JavaMethodExtractor, UNKNOWN_METHOD_NAME, UnitNameExtractor};

/// Deterministic identifier for an indexed unit.
///
/// Two code units with the same owning class and signature map to the same
/// id. The signature is preferred as the discriminator; the method name is
/// the fallback when no signature is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Builds an id from a class name and a discriminator (signature or
    /// method name).
    #[must_use]
    pub fn new(class_name: &str, discriminator: &str) -> Self {
        Self(format!("{class_name}-{discriminator}"))
    }

    /// Builds the id for a unit, preferring the signature over the method
    /// name as the discriminator.
    #[must_use]
    pub fn for_unit(class_name: &str, signature: &str, method_name: &str) -> Self {
        let signature = signature.trim();
        if signature.is_empty() {
            Self::new(class_name, method_name)
        } else {
            Self::new(class_name, signature)
        }
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalizes a method name: trims whitespace and truncates at the first
/// `(` so `"bar(int x)"` and `"bar"` resolve to the same name.
#[must_use]
pub fn normalize_method_name(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed.find('(') {
        Some(pos) => trimmed[..pos].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Accumulating set of class names known to depend on a unit.
///
/// Grows monotonically under merge and never shrinks. Kept as a genuine
/// ordered set internally; the original's substring-containment check over
/// a joined string both false-negatives ("A" vs "AB") and is fragile, so
/// the comma-joined form only appears at the serialization boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentClasses(Vec<String>);

impl DependentClasses {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with a single member.
    #[must_use]
    pub fn single(name: &str) -> Self {
        let mut set = Self::new();
        set.insert(name);
        set
    }

    /// Parses a comma-joined string as produced by `to_joined`.
    #[must_use]
    pub fn from_joined(joined: &str) -> Self {
        let mut set = Self::new();
        for part in joined.split(',') {
            set.insert(part);
        }
        set
    }

    /// Serializes the set to a comma-joined string in insertion order.
    #[must_use]
    pub fn to_joined(&self) -> String {
        self.0.join(",")
    }

    /// Returns true if `name` is a member of the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.0.iter().any(|member| member == name)
    }

    /// Inserts a class name, preserving insertion order.
    ///
    /// Returns true if the value was newly added, false if it was already
    /// present or blank.
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

// Serialized as the comma-joined string so the stored form matches what
// external consumers of the metadata expect.
impl Serialize for DependentClasses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_joined())
    }
}

impl<'de> Deserialize<'de> for DependentClasses {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(Self::from_joined(&joined))
    }
}

/// Descriptive metadata stored alongside a unit's embedding.
///
/// All fields except `dependent_classes` are write-once: a merge on upsert
/// only ever grows the dependent set, and never regenerates the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Owning class of the unit.
    pub class_name: String,

    /// Normalized method name; equals `class_name` for constructors.
    pub method_name: String,

    /// Full signature, possibly empty when unknown.
    #[serde(default)]
    pub signature: String,

    /// Source text the embedding was generated from.
    pub code: String,

    /// Free-form documentation comment.
    #[serde(default)]
    pub comment: String,

    /// Annotations attached to the unit, serialized by the caller.
    #[serde(default)]
    pub annotations: String,

    /// Same-class methods this unit calls.
    #[serde(default)]
    pub dependent_methods: Vec<String>,

    /// Classes known to depend on this unit. Grows under merge.
    #[serde(default)]
    pub dependent_classes: DependentClasses,

    /// True iff the normalized method name equals the class name.
    pub is_constructor: bool,
}

impl UnitMetadata {
    /// Returns the unit id for this metadata.
    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        UnitId::for_unit(&self.class_name, &self.signature, &self.method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_prefers_signature() {
        let with_sig = UnitId::for_unit("Foo", "bar()", "bar");
        assert_eq!(with_sig.as_str(), "Foo-bar()");

        let without_sig = UnitId::for_unit("Foo", "  ", "bar");
        assert_eq!(without_sig.as_str(), "Foo-bar");
    }

    #[test]
    fn test_unit_id_is_deterministic() {
        let a = UnitId::for_unit("Foo", "int bar(int)", "bar");
        let b = UnitId::for_unit("Foo", "int bar(int)", "somethingElse");
        // Same class and signature, same id regardless of method name
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_method_name() {
        assert_eq!(normalize_method_name("bar"), "bar");
        assert_eq!(normalize_method_name("  bar  "), "bar");
        assert_eq!(normalize_method_name("bar(int x, int y)"), "bar");
        assert_eq!(normalize_method_name("bar ("), "bar");
        assert_eq!(normalize_method_name(""), "");
    }

    #[test]
    fn test_dependent_classes_insert_and_contains() {
        let mut deps = DependentClasses::new();
        assert!(deps.insert("A"));
        assert!(deps.insert("B"));

        // Duplicate and blank inserts are no-ops
        assert!(!deps.insert("A"));
        assert!(!deps.insert("  "));

        assert!(deps.contains("A"));
        assert!(deps.contains("B"));
        assert!(!deps.contains("C"));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_dependent_classes_no_substring_false_positive() {
        // "A" must not be considered present just because "AB" is
        let deps = DependentClasses::from_joined("AB");
        assert!(!deps.contains("A"));
        assert!(deps.contains("AB"));
    }

    #[test]
    fn test_dependent_classes_joined_round_trip() {
        let deps = DependentClasses::from_joined("A, B ,C,,A");
        assert_eq!(deps.to_joined(), "A,B,C");

        let round = DependentClasses::from_joined(&deps.to_joined());
        assert_eq!(round, deps);
    }

    #[test]
    fn test_dependent_classes_serde_as_string() {
        let deps = DependentClasses::from_joined("A,B");
        let json = serde_json::to_string(&deps).unwrap();
        assert_eq!(json, "\"A,B\"");

        let back: DependentClasses = serde_json::from_str(&json).unwrap();
        assert_eq!(back, deps);
    }

    #[test]
    fn test_metadata_unit_id() {
        let metadata = UnitMetadata {
            class_name: "Foo".to_string(),
            method_name: "bar".to_string(),
            signature: "bar()".to_string(),
            code: "public void bar() {}".to_string(),
            comment: String::new(),
            annotations: String::new(),
            dependent_methods: Vec::new(),
            dependent_classes: DependentClasses::new(),
            is_constructor: false,
        };

        assert_eq!(metadata.unit_id().as_str(), "Foo-bar()");
    }
}
