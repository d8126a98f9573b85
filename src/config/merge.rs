// src/config/merge.rs

//! Typed deep merge used by `extends` and the default cascade, plus the
//! untyped document merge used when composing YAML documents.
//!
//! Semantics: mappings merge key by key, structs merge field by field,
//! lists and scalars are replaced wholesale by the later source.

use indexmap::IndexMap;
use serde_yaml::Value;

pub trait Merge {
    /// Merge `later` into `self`; `later` wins on conflicts.
    fn merge(&mut self, later: Self);
}

/// Types that are replaced wholesale when merged.
macro_rules! replace_on_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::config::merge::Merge for $ty {
                fn merge(&mut self, later: Self) {
                    *self = later;
                }
            }
        )*
    };
}

/// Field-by-field merge for structs whose fields all implement [`Merge`].
macro_rules! merge_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::config::merge::Merge for $ty {
            fn merge(&mut self, later: Self) {
                $( $crate::config::merge::Merge::merge(&mut self.$field, later.$field); )*
            }
        }
    };
}

pub(crate) use {merge_fields, replace_on_merge};

replace_on_merge!(String, bool, u32, Vec<String>);

impl<T: Merge> Merge for Option<T> {
    fn merge(&mut self, later: Self) {
        let Some(later) = later else {
            return;
        };
        match self {
            Some(current) => current.merge(later),
            None => *self = Some(later),
        }
    }
}

impl<V: Merge> Merge for IndexMap<String, V> {
    fn merge(&mut self, later: Self) {
        for (key, value) in later {
            match self.get_mut(&key) {
                Some(current) => current.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

impl Merge for Value {
    fn merge(&mut self, later: Self) {
        deep_merge(self, later);
    }
}

/// Deep-merge two YAML values in place.
pub fn deep_merge(base: &mut Value, later: Value) {
    match (base, later) {
        (Value::Mapping(base_map), Value::Mapping(later_map)) => {
            for (key, value) in later_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, later) => *base = later,
    }
}
