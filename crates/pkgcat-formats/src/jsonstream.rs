//! Streaming extraction from large JSON documents
//!
//! Catalog sources deliver one JSON document per release, with every record
//! under a top-level `"packages"` object:
//!
//! ```json
//! { "version": 2, "packages": { "hello": { ... }, "jq": { ... } } }
//! ```
//!
//! Decoding that into a tree costs far more than the ingestion itself, so
//! [`parse_records`] drives `serde_json`'s deserializer directly and hands
//! each record to a visitor as the exact source bytes of its value. Nothing
//! but the current record is held in memory.
//!
//! [`find_path`] answers "what is the string at `meta.description`" for a
//! single record, skipping sibling values without building them and
//! stopping as soon as the answer is known.

use crate::error::{FormatError, FormatResult};
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::value::RawValue;
use std::fmt;
use std::io::{BufReader, Read};

/// Name of the top-level field holding the record object
pub const PACKAGES_FIELD: &str = "packages";

/// Sentinel message used to unwind the deserializer once we are done.
///
/// The real outcome is carried next to the deserializer, never in this error.
const STOP: &str = "pkgcat: extraction stopped";

const READ_BUFFER: usize = 64 * 1024;

/// Visit every record of the `"packages"` object in source order.
///
/// `visit` receives the record name and the raw bytes of its value exactly
/// as they appear in the source (any JSON type). The stream is consumed in
/// a single pass. If `visit` fails, iteration stops at once and its error
/// is returned unchanged.
///
/// Fails with [`FormatError::Malformed`] if the document is not valid JSON,
/// has no `"packages"` field, or that field is not an object.
pub fn parse_records<R, F, E>(reader: R, mut visit: F) -> Result<(), E>
where
    R: Read,
    F: FnMut(&str, &[u8]) -> Result<(), E>,
    E: From<FormatError>,
{
    let mut failure = None;
    let mut de = serde_json::Deserializer::from_reader(BufReader::with_capacity(READ_BUFFER, reader));

    let outcome = DocumentSeed {
        visit: &mut visit,
        failure: &mut failure,
    }
    .deserialize(&mut de)
    .and_then(|()| de.end());

    if let Some(err) = failure {
        return Err(err);
    }
    outcome.map_err(|e| FormatError::from_json(e).into())
}

/// Find the string at a dot-separated chain of object keys.
///
/// Returns an empty string if any segment is missing (or an intermediate
/// value is not an object). Fails with [`FormatError::TypeMismatch`] if the
/// target exists but is not a string. Reading stops as soon as the outcome
/// is known, so the rest of the document is neither read nor validated.
pub fn find_path<R: Read>(reader: R, path: &str) -> FormatResult<String> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut state = Lookup::Pending;
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));

    let outcome = PathSeed {
        segments: &segments,
        state: &mut state,
    }
    .deserialize(&mut de);

    match state {
        Lookup::Found(value) => Ok(value),
        Lookup::Absent => Ok(String::new()),
        Lookup::Mismatch(found) => Err(FormatError::TypeMismatch {
            path: path.to_string(),
            found,
        }),
        Lookup::Pending => outcome
            .map(|()| String::new())
            .map_err(FormatError::from_json),
    }
}

struct DocumentSeed<'a, F, E> {
    visit: &'a mut F,
    failure: &'a mut Option<E>,
}

impl<'de, F, E> DeserializeSeed<'de> for DocumentSeed<'_, F, E>
where
    F: FnMut(&str, &[u8]) -> Result<(), E>,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F, E> Visitor<'de> for DocumentSeed<'_, F, E>
where
    F: FnMut(&str, &[u8]) -> Result<(), E>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object with a \"{PACKAGES_FIELD}\" field")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let Self { visit, failure } = self;
        let mut seen = false;

        while let Some(key) = map.next_key::<String>()? {
            if key != PACKAGES_FIELD {
                map.next_value::<IgnoredAny>()?;
                continue;
            }
            if seen {
                return Err(de::Error::duplicate_field(PACKAGES_FIELD));
            }
            seen = true;
            map.next_value_seed(PackagesSeed {
                visit: &mut *visit,
                failure: &mut *failure,
            })?;
        }

        if seen {
            Ok(())
        } else {
            Err(de::Error::missing_field(PACKAGES_FIELD))
        }
    }
}

struct PackagesSeed<'a, F, E> {
    visit: &'a mut F,
    failure: &'a mut Option<E>,
}

impl<'de, F, E> DeserializeSeed<'de> for PackagesSeed<'_, F, E>
where
    F: FnMut(&str, &[u8]) -> Result<(), E>,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F, E> Visitor<'de> for PackagesSeed<'_, F, E>
where
    F: FnMut(&str, &[u8]) -> Result<(), E>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping record names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let Self { visit, failure } = self;

        while let Some(name) = map.next_key::<String>()? {
            let raw = map.next_value::<Box<RawValue>>()?;
            if let Err(err) = visit(&name, raw.get().as_bytes()) {
                *failure = Some(err);
                return Err(de::Error::custom(STOP));
            }
        }
        Ok(())
    }
}

enum Lookup {
    Pending,
    Found(String),
    Absent,
    Mismatch(&'static str),
}

fn resolve<E: de::Error>(state: &mut Lookup, outcome: Lookup) -> Result<(), E> {
    *state = outcome;
    Err(E::custom(STOP))
}

struct PathSeed<'s, 'p> {
    segments: &'p [&'p str],
    state: &'s mut Lookup,
}

impl<'de> DeserializeSeed<'de> for PathSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for PathSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let Self { segments, state } = self;
        let Some((head, rest)) = segments.split_first() else {
            return resolve(state, Lookup::Absent);
        };

        while let Some(key) = map.next_key::<String>()? {
            if key != *head {
                map.next_value::<IgnoredAny>()?;
                continue;
            }
            return if rest.is_empty() {
                map.next_value_seed(TargetSeed { state })
            } else {
                map.next_value_seed(PathSeed {
                    segments: rest,
                    state,
                })
            };
        }

        resolve(state, Lookup::Absent)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<(), A::Error> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_i64<E: de::Error>(self, _v: i64) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_str<E: de::Error>(self, _v: &str) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        resolve(self.state, Lookup::Absent)
    }
}

struct TargetSeed<'s> {
    state: &'s mut Lookup,
}

impl<'de> DeserializeSeed<'de> for TargetSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for TargetSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        resolve(self.state, Lookup::Found(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<(), E> {
        resolve(self.state, Lookup::Found(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> Result<(), A::Error> {
        resolve(self.state, Lookup::Mismatch("object"))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<(), A::Error> {
        resolve(self.state, Lookup::Mismatch("array"))
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<(), E> {
        resolve(self.state, Lookup::Mismatch("boolean"))
    }

    fn visit_i64<E: de::Error>(self, _v: i64) -> Result<(), E> {
        resolve(self.state, Lookup::Mismatch("number"))
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<(), E> {
        resolve(self.state, Lookup::Mismatch("number"))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<(), E> {
        resolve(self.state, Lookup::Mismatch("number"))
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        resolve(self.state, Lookup::Mismatch("null"))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    fn collect(doc: &str) -> FormatResult<Vec<(String, String)>> {
        let mut records = Vec::new();
        parse_records(doc.as_bytes(), |name, raw| {
            records.push((name.to_string(), String::from_utf8(raw.to_vec()).unwrap()));
            Ok::<(), FormatError>(())
        })?;
        Ok(records)
    }

    #[test]
    fn test_records_in_source_order_with_exact_bytes() {
        let records = collect(r#"{"packages":{"a":{"x":1},"b":{"y":2}}}"#).unwrap();
        assert_eq!(
            records,
            vec![
                ("a".to_string(), r#"{"x":1}"#.to_string()),
                ("b".to_string(), r#"{"y":2}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_surrounding_fields_and_whitespace() {
        let doc = r#"
        {
          "version": 1,
          "meta": { "packages": "not this one" , "n": [1, 2] },
          "packages": {
            "pkg1": { "mainProgram":  "pkg1" },
            "pkg2":   [1, "two", null]
          },
          "trailer": true
        }
        "#;

        let records = collect(doc).unwrap();
        assert_eq!(
            records,
            vec![
                ("pkg1".to_string(), r#"{ "mainProgram":  "pkg1" }"#.to_string()),
                ("pkg2".to_string(), r#"[1, "two", null]"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_any_value_type_is_accepted() {
        let records =
            collect(r#"{"packages":{"s":"str","n":-1.5e3,"t":true,"z":null,"e":{}}}"#).unwrap();
        let raw: Vec<&str> = records.iter().map(|(_, raw)| raw.as_str()).collect();
        assert_eq!(raw, ["\"str\"", "-1.5e3", "true", "null", "{}"]);
    }

    #[test]
    fn test_escaped_names_are_decoded() {
        let records = collect(r#"{"packages":{"a\"bé":1}}"#).unwrap();
        assert_eq!(records[0].0, "a\"bé");
    }

    #[test]
    fn test_empty_packages_object() {
        assert!(collect(r#"{"packages":{}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        for doc in [
            r#"{"version":1}"#,
            r#"{"packages":[]}"#,
            r#"{"packages":"nope"}"#,
            r#"["packages"]"#,
            r#"{"packages":{"a":1,}}"#,
            r#"{"packages":{"a":1}"#,
            r#"{"packages":{"a":1}} trailing"#,
            "",
        ] {
            let err = collect(doc).unwrap_err();
            assert!(
                matches!(err, FormatError::Malformed(_)),
                "{doc:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_visitor_error_stops_iteration() {
        #[derive(Debug)]
        enum TestError {
            Stop(String),
            Format,
        }
        impl From<FormatError> for TestError {
            fn from(_: FormatError) -> Self {
                Self::Format
            }
        }

        let mut seen = Vec::new();
        let err = parse_records(
            &br#"{"packages":{"a":1,"b":2,"c":3}}"#[..],
            |name, _| {
                seen.push(name.to_string());
                if name == "b" {
                    return Err(TestError::Stop(name.to_string()));
                }
                Ok(())
            },
        )
        .unwrap_err();

        assert!(matches!(err, TestError::Stop(ref n) if n == "b"));
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn test_reader_failure_is_io_error() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("connection reset"))
            }
        }

        let err = parse_records(Failing, |_, _| Ok::<(), FormatError>(())).unwrap_err();
        assert!(matches!(err, FormatError::Io(_)));
    }

    #[test]
    fn test_find_path_top_level_and_nested() {
        assert_eq!(find_path(&br#"{ "version": "v1" }"#[..], "version").unwrap(), "v1");
        assert_eq!(
            find_path(&br#"{"meta":{"description":"d"}}"#[..], "meta.description").unwrap(),
            "d"
        );
    }

    #[test]
    fn test_find_path_missing_segments() {
        let doc = br#"{"meta":{"description":"d"},"name":"x"}"#;
        for path in ["meta.missing", "missing", "missing.deeper", "name.deeper"] {
            assert_eq!(find_path(&doc[..], path).unwrap(), "", "{path}");
        }
    }

    #[test]
    fn test_find_path_type_mismatch() {
        let err = find_path(&br#"{"v":1}"#[..], "v").unwrap_err();
        assert!(matches!(
            err,
            FormatError::TypeMismatch { ref path, found: "number" } if path == "v"
        ));

        let err = find_path(&br#"{"meta":{"license":{"spdx":"MIT"}}}"#[..], "meta.license")
            .unwrap_err();
        assert!(matches!(err, FormatError::TypeMismatch { found: "object", .. }));
    }

    #[test]
    fn test_find_path_stops_after_target() {
        // Everything after the target is garbage; a full parse would fail.
        let doc = br#"{"meta":{"description":"early"}, this is not json"#;
        assert_eq!(find_path(&doc[..], "meta.description").unwrap(), "early");

        // Once "meta" is closed without the key, the answer is known.
        let doc = br#"{"meta":{"homepage":"h"}, !!!"#;
        assert_eq!(find_path(&doc[..], "meta.description").unwrap(), "");
    }

    #[test]
    fn test_find_path_decodes_escapes() {
        let doc = br#"{"meta":{"description":"tab\tand \"quotes\""}}"#;
        assert_eq!(
            find_path(&doc[..], "meta.description").unwrap(),
            "tab\tand \"quotes\""
        );
    }

    #[test]
    fn test_find_path_invalid_before_target() {
        let err = find_path(&br#"{"meta": nope}"#[..], "meta.description").unwrap_err();
        assert!(matches!(err, FormatError::Malformed(_)));
    }
}
