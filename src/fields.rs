//! Ordered, case-insensitive, multi-valued field storage shared by every AMI message.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    /// Spelling of the first occurrence.
    name: String,
    values: Vec<String>,
}

/// Field mapping of one AMI block.
///
/// Keys compare case-insensitively (`ActionID` == `ActionId`). Repeated keys
/// accumulate values in arrival order instead of overwriting, which is how
/// AMI carries `Variable:` and `Output:` lines. A missing field is `None`,
/// never an error.
///
/// ```
/// use asterisk_ami_tokio::FieldMap;
///
/// let mut fields = FieldMap::new();
/// fields.append("Variable", "a=1");
/// fields.append("variable", "b=2");
/// assert_eq!(fields.get("VARIABLE"), Some("a=1"));
/// assert_eq!(fields.get_all("Variable"), ["a=1", "b=2"]);
/// assert_eq!(fields.get("Missing"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: IndexMap<String, Field>,
}

fn key_of(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl FieldMap {
    /// Empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `name`, if present.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(&key_of(name.as_ref()))
            .and_then(|f| f.values.first())
            .map(|s| s.as_str())
    }

    /// Every value of `name` in arrival order; empty when absent.
    pub fn get_all(&self, name: impl AsRef<str>) -> &[String] {
        self.fields
            .get(&key_of(name.as_ref()))
            .map(|f| f.values.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.fields
            .contains_key(&key_of(name.as_ref()))
    }

    /// Set `name` to a single value, replacing anything stored under it.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = key_of(&name);
        match self
            .fields
            .get_mut(&key)
        {
            Some(field) => field.values = vec![value.into()],
            None => {
                self.fields.insert(
                    key,
                    Field {
                        name,
                        values: vec![value.into()],
                    },
                );
            }
        }
    }

    /// Add a value under `name`, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = key_of(&name);
        self.fields
            .entry(key)
            .or_insert_with(|| Field {
                name,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Extend the last value of `name` with a continuation line.
    ///
    /// Returns `false` when `name` has no value to extend.
    pub(crate) fn continue_last(&mut self, name: &str, line: &str, terminator: &str) -> bool {
        match self
            .fields
            .get_mut(&key_of(name))
            .and_then(|f| f.values.last_mut())
        {
            Some(last) => {
                last.push_str(terminator);
                last.push_str(line);
                true
            }
            None => false,
        }
    }

    /// Remove `name`, returning its values.
    pub fn remove(&mut self, name: impl AsRef<str>) -> Option<Vec<String>> {
        self.fields
            .shift_remove(&key_of(name.as_ref()))
            .map(|f| f.values)
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.fields
            .len()
    }

    /// `true` if no field is present.
    pub fn is_empty(&self) -> bool {
        self.fields
            .is_empty()
    }

    /// Field names in first-seen order, with their original spelling.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .map(|f| f.name.as_str())
    }

    /// `(name, value)` pairs, one per value, grouped by field in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .flat_map(|f| {
                f.values
                    .iter()
                    .map(move |v| (f.name.as_str(), v.as_str()))
            })
    }
}

impl PartialEq for FieldMap {
    /// Same fields, in the same order, with the same values.
    fn eq(&self, other: &Self) -> bool {
        self.fields
            .iter()
            .eq(other
                .fields
                .iter())
    }
}

impl Eq for FieldMap {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.append(k, v);
        }
        map
    }
}
