//! Typed filter and update documents.
//!
//! Call sites never assemble raw key/value maps. A [`Filter`] is a
//! conjunction of equality predicates and an [`Update`] is either a field
//! merge or a numeric increment; both render to the same wire shapes the
//! store expects (`{"a.b": v}`, `{"$set": {..}}`, `{"$inc": {..}}`).

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::{StoreError, StoreResult};

/// Untyped document as exchanged with a backend.
pub type Document = Map<String, Value>;

/// Dotted path to a (possibly nested) document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Path to a top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Path through nested sub-documents, outermost segment first.
    pub fn nested<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Extend the path by one segment.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }

    /// Wire form, e.g. `sessionReq.Qos`.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    fn validate(&self) -> StoreResult<()> {
        if self.0.is_empty() || self.0.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidInput(format!(
                "malformed field path `{}`",
                self.dotted()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// One equality condition of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Top-level field equals value.
    Equals { field: String, value: Value },
    /// Field inside a nested sub-document equals value.
    NestedEquals { path: FieldPath, value: Value },
}

impl Predicate {
    pub fn path(&self) -> FieldPath {
        match self {
            Self::Equals { field, .. } => FieldPath::field(field.clone()),
            Self::NestedEquals { path, .. } => path.clone(),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Self::Equals { value, .. } | Self::NestedEquals { value, .. } => value,
        }
    }

    fn matches(&self, doc: &Document) -> bool {
        let found = match self {
            Self::Equals { field, .. } => doc.get(field),
            Self::NestedEquals { path, .. } => lookup(doc, path),
        };
        found == Some(self.value())
    }
}

/// Conjunction of equality predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality predicate. A dotted name addresses a nested field,
    /// as it does on the wire.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.eq_nested(FieldPath::nested(field.split('.')), value)
    }

    /// Add an equality predicate on a nested field.
    pub fn eq_nested(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        let value = value.into();
        let predicate = match path.segments() {
            [single] => Predicate::Equals {
                field: single.clone(),
                value,
            },
            _ => Predicate::NestedEquals { path, value },
        };
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_all(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Wire form: `{ "<dotted path>": value, ... }`.
    pub fn to_document(&self) -> Document {
        self.predicates
            .iter()
            .map(|p| (p.path().dotted(), p.value().clone()))
            .collect()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }

    /// Base document for an upsert that found no match: every equality
    /// field, with nested paths expanded into sub-documents.
    pub fn seed_document(&self) -> StoreResult<Document> {
        let mut doc = Document::new();
        for predicate in &self.predicates {
            let path = predicate.path();
            path.validate()?;
            set_path(&mut doc, &path, predicate.value().clone())?;
        }
        Ok(doc)
    }
}

/// Update applied to a matched (or freshly seeded) document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Field-level merge; keys may be dotted paths.
    Set(Document),
    /// Add `by` to a numeric field, treating a missing field as zero.
    Increment { field: FieldPath, by: i64 },
}

impl Update {
    pub fn set(fields: Document) -> Self {
        Self::Set(fields)
    }

    pub fn increment(field: FieldPath, by: i64) -> Self {
        Self::Increment { field, by }
    }

    /// Wire form: `{"$set": {..}}` or `{"$inc": {field: by}}`.
    pub fn to_document(&self) -> Document {
        let (operator, body) = match self {
            Self::Set(fields) => ("$set", fields.clone()),
            Self::Increment { field, by } => {
                let mut body = Document::new();
                body.insert(field.dotted(), Value::from(*by));
                ("$inc", body)
            }
        };
        let mut doc = Document::new();
        doc.insert(operator.to_string(), Value::Object(body));
        doc
    }

    /// Apply in place. On error `doc` may be partially modified, so callers
    /// apply to a copy.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<()> {
        match self {
            Self::Set(fields) => {
                for (key, value) in fields {
                    let path = FieldPath::nested(key.split('.'));
                    path.validate()?;
                    set_path(doc, &path, value.clone())?;
                }
                Ok(())
            }
            Self::Increment { field, by } => {
                field.validate()?;
                let next = match lookup(doc, field) {
                    None | Some(Value::Null) => Value::from(*by),
                    Some(Value::Number(current)) => add(current, *by).ok_or_else(|| {
                        StoreError::InvalidInput(format!("increment of `{field}` overflows"))
                    })?,
                    Some(_) => {
                        return Err(StoreError::InvalidInput(format!(
                            "cannot increment non-numeric field `{field}`"
                        )))
                    }
                };
                set_path(doc, field, next)
            }
        }
    }
}

fn lookup<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let (last, parents) = path.segments().split_last()?;
    let mut current = doc;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(last)
}

fn set_path(doc: &mut Document, path: &FieldPath, value: Value) -> StoreResult<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(StoreError::InvalidInput("empty field path".to_string()));
    };
    let mut current = doc;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Document::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            StoreError::InvalidInput(format!(
                "cannot set `{path}`: `{segment}` is not a sub-document"
            ))
        })?;
    }
    current.insert(last.clone(), value);
    Ok(())
}

fn add(current: &Number, by: i64) -> Option<Value> {
    if let Some(n) = current.as_i64() {
        return n.checked_add(by).map(Value::from);
    }
    if let Some(n) = current.as_u64() {
        // Above i64::MAX; only reachable for counters stored as u64.
        return if by >= 0 {
            n.checked_add(by as u64).map(Value::from)
        } else {
            n.checked_sub(by.unsigned_abs()).map(Value::from)
        };
    }
    current
        .as_f64()
        .and_then(|n| Number::from_f64(n + by as f64))
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn filter_renders_dotted_paths() {
        let filter = Filter::all()
            .eq("ueIpv4Addr", "10.0.0.5")
            .eq_nested(FieldPath::nested(["sessionReq", "Qos"]), "QOS_E");

        assert_eq!(
            Value::Object(filter.to_document()),
            json!({"ueIpv4Addr": "10.0.0.5", "sessionReq.Qos": "QOS_E"})
        );
    }

    #[test]
    fn dotted_eq_matches_nested_field_like_the_wire_form() {
        let dotted = Filter::all().eq("sessionReq.Qos", "QOS_E");
        assert_eq!(
            dotted,
            Filter::all().eq_nested(FieldPath::nested(["sessionReq", "Qos"]), "QOS_E")
        );
        assert_eq!(
            Value::Object(dotted.to_document()),
            json!({"sessionReq.Qos": "QOS_E"})
        );
        assert!(dotted.matches(&doc(json!({"sessionReq": {"Qos": "QOS_E"}}))));
        assert!(!dotted.matches(&doc(json!({"sessionReq.Qos": "QOS_E"}))));
    }

    #[test]
    fn single_segment_nested_path_is_plain_equality() {
        let filter = Filter::all().eq_nested(FieldPath::field("sessionId"), "s1");
        assert!(matches!(
            filter.predicates()[0],
            Predicate::Equals { ref field, .. } if field == "sessionId"
        ));
    }

    #[test]
    fn nested_predicate_matches_sub_document() {
        let filter = Filter::all().eq_nested(FieldPath::nested(["sessionReq", "Qos"]), "QOS_L");
        assert!(filter.matches(&doc(json!({"sessionReq": {"Qos": "QOS_L"}}))));
        assert!(!filter.matches(&doc(json!({"sessionReq": {"Qos": "QOS_S"}}))));
        assert!(!filter.matches(&doc(json!({"sessionReq": "QOS_L"}))));
        assert!(Filter::all().matches(&doc(json!({"anything": 1}))));
    }

    #[test]
    fn seed_document_expands_nested_fields() {
        let seed = Filter::all()
            .eq("ueIpv4Addr", "10.0.0.5")
            .eq_nested(FieldPath::nested(["sessionReq", "Qos"]), "QOS_E")
            .seed_document()
            .unwrap();
        assert_eq!(
            Value::Object(seed),
            json!({"ueIpv4Addr": "10.0.0.5", "sessionReq": {"Qos": "QOS_E"}})
        );
    }

    #[test]
    fn increment_renders_inc_operator() {
        let update = Update::increment(FieldPath::field("FlowCounter"), 1);
        assert_eq!(
            Value::Object(update.to_document()),
            json!({"$inc": {"FlowCounter": 1}})
        );
    }

    #[test]
    fn increment_treats_missing_field_as_zero() {
        let update = Update::increment(FieldPath::field("FlowCounter"), 1);
        let mut target = doc(json!({"ueIpv4Addr": "10.0.0.5"}));
        update.apply(&mut target).unwrap();
        update.apply(&mut target).unwrap();
        assert_eq!(target["FlowCounter"], json!(2));
    }

    #[test]
    fn increment_rejects_non_numeric_field() {
        let update = Update::increment(FieldPath::field("FlowCounter"), 1);
        let mut target = doc(json!({"FlowCounter": "one"}));
        let err = update.apply(&mut target).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn set_merges_without_touching_other_fields() {
        let mut target = doc(json!({"asIpv4Addr": "10.0.0.1", "region": "us", "tier": 2}));
        Update::set(doc(json!({"region": "eu"})))
            .apply(&mut target)
            .unwrap();
        assert_eq!(
            Value::Object(target),
            json!({"asIpv4Addr": "10.0.0.1", "region": "eu", "tier": 2})
        );
    }

    #[test]
    fn set_through_scalar_is_rejected() {
        let mut target = doc(json!({"sessionReq": "flat"}));
        let err = Update::set(doc(json!({"sessionReq.Qos": "QOS_E"})))
            .apply(&mut target)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
