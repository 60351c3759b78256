//! Enum-keyed, fixed-size factor map.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Factor;

/// One value per [`Factor`], always complete.
///
/// Serialises as a JSON object keyed by factor name. Deserialisation fails if
/// any factor is missing.
#[derive(Clone, Copy, PartialEq)]
pub struct FactorMap<T> {
    values: [T; Factor::COUNT],
}

impl<T> FactorMap<T> {
    pub fn from_fn(mut f: impl FnMut(Factor) -> T) -> Self {
        Self {
            values: std::array::from_fn(|i| f(Factor::ALL[i])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, &T)> + '_ {
        Factor::ALL.into_iter().zip(self.values.iter())
    }

    pub fn values(&self) -> &[T; Factor::COUNT] {
        &self.values
    }

    pub fn map<U>(&self, mut f: impl FnMut(Factor, &T) -> U) -> FactorMap<U> {
        FactorMap::from_fn(|factor| f(factor, &self.values[factor.index()]))
    }
}

impl<T: Copy> FactorMap<T> {
    pub fn splat(value: T) -> Self {
        Self {
            values: [value; Factor::COUNT],
        }
    }
}

impl FactorMap<f64> {
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

impl<T: Default> Default for FactorMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Factor> for FactorMap<T> {
    type Output = T;

    fn index(&self, factor: Factor) -> &T {
        &self.values[factor.index()]
    }
}

impl<T> IndexMut<Factor> for FactorMap<T> {
    fn index_mut(&mut self, factor: Factor) -> &mut T {
        &mut self.values[factor.index()]
    }
}

impl<T: fmt::Debug> fmt::Debug for FactorMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter().map(|(k, v)| (k.name(), v))).finish()
    }
}

impl<T: Serialize> Serialize for FactorMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Factor::COUNT))?;
        for (factor, value) in self.iter() {
            map.serialize_entry(&factor, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FactorMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw: BTreeMap<Factor, T> = BTreeMap::deserialize(deserializer)?;
        let values: Vec<T> = Factor::ALL
            .into_iter()
            .map(|f| {
                raw.remove(&f)
                    .ok_or_else(|| D::Error::custom(format!("missing factor `{f}`")))
            })
            .collect::<Result<_, _>>()?;
        let values: [T; Factor::COUNT] = values
            .try_into()
            .map_err(|_| D::Error::custom("wrong number of factors"))?;
        Ok(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_by_factor() {
        let mut m = FactorMap::splat(0.0);
        m[Factor::Spread] = 0.3;
        assert_eq!(m[Factor::Spread], 0.3);
        assert_eq!(m.values()[Factor::Spread.index()], 0.3);
    }

    #[test]
    fn serializes_as_named_object() {
        let m = FactorMap::from_fn(|f| f.index() as u32);
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json["delta"], 0);
        assert_eq!(json["trend_model"], 8);
        let back: FactorMap<u32> = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn missing_factor_rejected() {
        let json = serde_json::json!({ "delta": 1.0 });
        let err = serde_json::from_value::<FactorMap<f64>>(json).unwrap_err();
        assert!(err.to_string().contains("missing factor"));
    }

    #[test]
    fn unknown_factor_rejected() {
        let mut json = serde_json::to_value(FactorMap::splat(0.1)).unwrap();
        json["gamma_ghost"] = serde_json::json!(0.5);
        assert!(serde_json::from_value::<FactorMap<f64>>(json).is_err());
    }
}
