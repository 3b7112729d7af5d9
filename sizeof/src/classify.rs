/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use allocative::Allocative;
use dupe::Dupe;
use serde::Deserialize;
use serde::Serialize;

use crate::capability::Reflection;
use crate::capability::TypeKind;
use crate::field::Primitive;
use crate::object::ObjectRef;

/// How the traversal treats a reference.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash)]
pub enum Classification {
    /// Null reference.
    Null,
    /// Process-wide shared instance, never charged to a graph.
    SharedFlyweight,
    Array,
    Ordinary,
}

/// Inclusive range of values the host keeps canonical boxes for.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Serialize, Deserialize, Allocative)]
pub struct CacheRange {
    pub low: i64,
    pub high: i64,
}

impl CacheRange {
    /// Range containing nothing.
    pub const EMPTY: CacheRange = CacheRange { low: 0, high: -1 };

    pub const fn new(low: i64, high: i64) -> CacheRange {
        CacheRange { low, high }
    }

    #[inline]
    pub const fn contains(self, value: i64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Canonical box cache bounds of the host.
///
/// These are an implementation detail of the host (for example the JVM allows
/// raising the upper bound of the integer cache), hence configuration.
/// Defaults are the common JVM bounds.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Allocative)]
#[serde(default)]
pub struct FlyweightConfig {
    pub byte: CacheRange,
    pub short: CacheRange,
    pub char: CacheRange,
    pub int: CacheRange,
    pub long: CacheRange,
}

impl Default for FlyweightConfig {
    fn default() -> FlyweightConfig {
        FlyweightConfig {
            byte: CacheRange::new(-128, 127),
            short: CacheRange::new(-128, 127),
            char: CacheRange::new(0, 127),
            int: CacheRange::new(-128, 127),
            long: CacheRange::new(-128, 127),
        }
    }
}

impl FlyweightConfig {
    /// Nothing but booleans and enum constants is shared.
    pub fn no_integral_cache() -> FlyweightConfig {
        FlyweightConfig {
            byte: CacheRange::EMPTY,
            short: CacheRange::EMPTY,
            char: CacheRange::EMPTY,
            int: CacheRange::EMPTY,
            long: CacheRange::EMPTY,
        }
    }

    /// Parse JSON, missing keys take default values.
    pub fn from_json(json: &str) -> serde_json::Result<FlyweightConfig> {
        serde_json::from_str(json)
    }

    /// Cache range of boxes of given primitive, `None` if these boxes are never cached
    /// by range (booleans are cached by value, floating point not at all).
    pub fn range_for(&self, primitive: Primitive) -> Option<CacheRange> {
        match primitive {
            Primitive::Byte => Some(self.byte),
            Primitive::Short => Some(self.short),
            Primitive::Char => Some(self.char),
            Primitive::Int => Some(self.int),
            Primitive::Long => Some(self.long),
            Primitive::Boolean | Primitive::Float | Primitive::Double => None,
        }
    }
}

pub(crate) struct Classifier<'a> {
    reflection: &'a dyn Reflection,
    config: &'a FlyweightConfig,
}

impl<'a> Classifier<'a> {
    pub(crate) fn new(reflection: &'a dyn Reflection, config: &'a FlyweightConfig) -> Self {
        Classifier { reflection, config }
    }

    pub(crate) fn classify(&self, obj: Option<ObjectRef>) -> Classification {
        let Some(obj) = obj else {
            return Classification::Null;
        };
        match self.reflection.type_kind(self.reflection.type_of(obj)) {
            TypeKind::Array => Classification::Array,
            TypeKind::Enum => Classification::SharedFlyweight,
            TypeKind::Boxed(primitive) if self.is_canonical_box(obj, primitive) => {
                Classification::SharedFlyweight
            }
            TypeKind::Boxed(_) | TypeKind::Class => Classification::Ordinary,
        }
    }

    /// Box is shared iff re-boxing its payload through the host cache
    /// yields the very same object.
    fn is_canonical_box(&self, obj: ObjectRef, primitive: Primitive) -> bool {
        let Some(value) = self.reflection.unbox(obj) else {
            return false;
        };
        let cacheable = match primitive {
            Primitive::Boolean => true,
            _ => match (self.config.range_for(primitive), value.as_integral()) {
                (Some(range), Some(v)) => range.contains(v),
                _ => false,
            },
        };
        cacheable && self.reflection.canonical_box(value) == Some(obj)
    }
}

#[cfg(test)]
mod tests {
    use crate::classify::CacheRange;
    use crate::classify::Classification;
    use crate::classify::Classification::Ordinary;
    use crate::classify::Classification::SharedFlyweight;
    use crate::classify::Classifier;
    use crate::classify::FlyweightConfig;
    use crate::field::FieldType;
    use crate::field::Primitive;
    use crate::field::PrimitiveValue;
    use crate::sim::ClassDef;
    use crate::sim::Heap;
    use crate::sim::HeapConfig;

    fn classify_all(
        heap: &mut Heap,
        config: &FlyweightConfig,
        values: &[PrimitiveValue],
    ) -> Vec<Classification> {
        let boxes: Vec<_> = values.iter().map(|v| heap.value_of(*v)).collect();
        let classifier = Classifier::new(&*heap, config);
        boxes
            .iter()
            .map(|b| classifier.classify(Some(*b)))
            .collect()
    }

    #[test]
    fn test_null_array_ordinary() {
        let mut heap = Heap::new();
        let plain = heap.define(ClassDef::new("Plain")).unwrap();
        let obj = heap.new_object(plain).unwrap();
        let array = heap.new_array(FieldType::Primitive(Primitive::Int), 3);
        let config = FlyweightConfig::default();
        let classifier = Classifier::new(&heap, &config);
        assert_eq!(classifier.classify(None), Classification::Null);
        assert_eq!(classifier.classify(Some(obj)), Ordinary);
        assert_eq!(classifier.classify(Some(array)), Classification::Array);
    }

    #[test]
    fn test_enum_constants_are_shared() {
        let mut heap = Heap::new();
        let color = heap.define(ClassDef::new("Color").enumeration()).unwrap();
        let red = heap.new_enum_constant(color, "RED").unwrap();
        let config = FlyweightConfig::default();
        let classifier = Classifier::new(&heap, &config);
        assert_eq!(classifier.classify(Some(red)), SharedFlyweight);
    }

    #[test]
    fn test_booleans() {
        let mut heap = Heap::new();
        let config = FlyweightConfig::default();
        let values = [
            PrimitiveValue::Boolean(true),
            PrimitiveValue::Boolean(false),
        ];
        let got = classify_all(&mut heap, &config, &values);
        assert_eq!(got, vec![SharedFlyweight; 2]);
        let fresh = heap.new_box(PrimitiveValue::Boolean(true));
        let classifier = Classifier::new(&heap, &config);
        assert_eq!(classifier.classify(Some(fresh)), Ordinary);
    }

    #[test]
    fn test_integral_cache_bounds() {
        let mut heap = Heap::new();
        let config = FlyweightConfig::default();
        let values = [
            PrimitiveValue::Int(-129),
            PrimitiveValue::Int(-128),
            PrimitiveValue::Int(127),
            PrimitiveValue::Int(128),
        ];
        let got = classify_all(&mut heap, &config, &values);
        let expected = vec![Ordinary, SharedFlyweight, SharedFlyweight, Ordinary];
        assert_eq!(got, expected);
    }

    #[test]
    fn test_fresh_box_in_range_is_ordinary() {
        let mut heap = Heap::new();
        let fresh = heap.new_box(PrimitiveValue::Int(5));
        let cached = heap.value_of(PrimitiveValue::Int(5));
        assert_ne!(fresh, cached);
        let config = FlyweightConfig::default();
        let classifier = Classifier::new(&heap, &config);
        assert_eq!(classifier.classify(Some(fresh)), Ordinary);
        assert_eq!(classifier.classify(Some(cached)), SharedFlyweight);
    }

    #[test]
    fn test_widened_int_cache() {
        let widened = FlyweightConfig {
            int: CacheRange::new(-128, 1000),
            ..FlyweightConfig::default()
        };
        let mut heap = Heap::with_config(HeapConfig {
            box_cache: widened.clone(),
            ..HeapConfig::default()
        });
        let b = heap.value_of(PrimitiveValue::Int(1000));
        let classifier = Classifier::new(&heap, &widened);
        assert_eq!(classifier.classify(Some(b)), SharedFlyweight);

        // Host caches the box, but configuration says it does not.
        let narrow = FlyweightConfig::default();
        let classifier = Classifier::new(&heap, &narrow);
        assert_eq!(classifier.classify(Some(b)), Ordinary);
    }

    #[test]
    fn test_floating_point_and_strings_are_ordinary() {
        let mut heap = Heap::new();
        let config = FlyweightConfig::default();
        let d = heap.value_of(PrimitiveValue::Double(0.0));
        let s = heap.new_string("interned?");
        let classifier = Classifier::new(&heap, &config);
        assert_eq!(classifier.classify(Some(d)), Ordinary);
        assert_eq!(classifier.classify(Some(s)), Ordinary);
    }

    #[test]
    fn test_other_kinds_with_default_bounds() {
        let mut heap = Heap::new();
        let config = FlyweightConfig::default();
        let values = [
            PrimitiveValue::Char(127),
            PrimitiveValue::Char(128),
            PrimitiveValue::Byte(-128),
            PrimitiveValue::Short(300),
            PrimitiveValue::Long(-1),
        ];
        let got = classify_all(&mut heap, &config, &values);
        let expected = vec![
            SharedFlyweight,
            Ordinary,
            SharedFlyweight,
            Ordinary,
            SharedFlyweight,
        ];
        assert_eq!(got, expected);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{"int": {"low": -128, "high": 4096}}"#;
        let config = FlyweightConfig::from_json(json).unwrap();
        let default = FlyweightConfig::default();
        assert_eq!(config.int, CacheRange::new(-128, 4096));
        assert_eq!(config.char, default.char);
        assert_eq!(default.range_for(Primitive::Double), None);
        assert!(!CacheRange::EMPTY.contains(0));
        let none = FlyweightConfig::no_integral_cache();
        assert_eq!(none.range_for(Primitive::Int), Some(CacheRange::EMPTY));
    }
}
