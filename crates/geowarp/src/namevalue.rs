use crate::{Error, Result};

/// Ordered list of `KEY=VALUE` options with case insensitive keys
/// (transformer options, warp options, creation options, metadata).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NameValueList(Vec<(String, String)>);

impl NameValueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `KEY=VALUE` strings
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut list = NameValueList::new();
        for item in items {
            let item = item.as_ref();
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| Error::Usage(format!("Expected KEY=VALUE, got '{item}'")))?;
            list.set(key.trim(), value.trim());
        }
        Ok(list)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Interprets `YES`, `TRUE`, `ON` and `1` as true
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.to_ascii_uppercase().as_str(), "YES" | "TRUE" | "ON" | "1"),
            None => default,
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| Error::InvalidArgument(format!("Invalid numeric value for {key}: '{v}'")))
            })
            .transpose()
    }

    /// Replaces the value of an existing key, or appends it
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.0.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameValueList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = NameValueList::new();
        for (k, v) in iter {
            let key: String = k.into();
            list.set(&key, v);
        }
        list
    }
}

impl std::fmt::Display for NameValueList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
