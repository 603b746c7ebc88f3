//! Readers that coerce raw property shapes into primitives.
//!
//! Every reader takes a fallback and never fails: a missing property or an
//! unexpected shape yields the fallback.

use std::ops::BitOr;
use std::str::FromStr;

use log::warn;
use serde_json::{Map, Value};

type Properties = Map<String, Value>;

/// `{"number": 1.5}`
pub fn get_float(props: &Properties, key: &str, default: f64) -> f64 {
    props
        .get(key)
        .and_then(|p| p.get("number"))
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

/// `{"number": 3}` or `{"unique_id": {"number": 3}}`. Fractional numbers are truncated.
pub fn get_int(props: &Properties, key: &str, default: i64) -> i64 {
    let Some(prop) = props.get(key).and_then(Value::as_object) else {
        return default;
    };
    let number = if prop.contains_key("number") {
        prop.get("number")
    } else {
        prop.get("unique_id").and_then(|u| u.get("number"))
    };
    number
        .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)))
        .unwrap_or(default)
}

/// `{"checkbox": true}`
pub fn get_bool(props: &Properties, key: &str, default: bool) -> bool {
    props
        .get(key)
        .and_then(|p| p.get("checkbox"))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

/// First `plain_text` of a `title` or `rich_text` property, or the name of a `select`.
pub fn get_string(props: &Properties, key: &str, default: &str) -> String {
    let Some(prop) = props.get(key) else {
        return default.to_string();
    };
    let text = match prop.get("type").and_then(Value::as_str) {
        Some(kind @ ("title" | "rich_text")) => prop
            .get(kind)
            .and_then(|t| t.get(0))
            .and_then(|t| t.get("plain_text"))
            .and_then(Value::as_str),
        Some("select") => select_name(prop),
        _ => None,
    };
    text.unwrap_or(default).to_string()
}

/// Ids of a `relation` property. Accepts a list or a single relation object.
pub fn get_relations(props: &Properties, key: &str) -> Vec<String> {
    match props.get(key).and_then(|p| p.get("relation")) {
        Some(Value::Array(relations)) => relations
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Some(single) => single
            .get("id")
            .and_then(Value::as_str)
            .map(|id| vec![id.to_string()])
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Names of a `multi_select` property, in stored order.
pub fn get_multi_select(props: &Properties, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|p| p.get("multi_select"))
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `select` name parsed as `T` after removing spaces ("Heavy Armor" -> "HeavyArmor").
///
/// Case handling is up to `T::from_str`.
pub fn get_enum<T: FromStr>(props: &Properties, key: &str, default: T) -> T {
    let Some(name) = props.get(key).and_then(select_name) else {
        warn!("[Values] Error reading '{}'. The value can not be null", key);
        return default;
    };
    parse_compact(name).unwrap_or_else(|| {
        warn!("[Values] Error reading '{}'. Could not read value '{}'", key, name);
        default
    })
}

/// `multi_select` names parsed as `T` and combined with `|`.
///
/// Any unreadable option, or an empty selection, yields `default`.
pub fn get_flags<T>(props: &Properties, key: &str, default: T) -> T
where
    T: FromStr + BitOr<Output = T> + Copy,
{
    let names = get_multi_select(props, key);
    let mut combined: Option<T> = None;
    for name in &names {
        let Some(flag) = parse_compact::<T>(name) else {
            warn!("[Values] Error reading '{}'. Could not read value '{}'", key, name);
            return default;
        };
        combined = Some(match combined {
            Some(acc) => acc | flag,
            None => default | flag,
        });
    }
    combined.unwrap_or(default)
}

fn select_name(prop: &Value) -> Option<&str> {
    prop.get("select")?.get("name")?.as_str()
}

fn parse_compact<T: FromStr>(name: &str) -> Option<T> {
    name.replace(' ', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        let mut map = Map::new();
        map.insert("key".to_string(), value);
        map
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Armor {
        Light,
        HeavyArmor,
    }

    impl FromStr for Armor {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, ()> {
            match s.to_ascii_lowercase().as_str() {
                "light" => Ok(Self::Light),
                "heavyarmor" => Ok(Self::HeavyArmor),
                _ => Err(()),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tags(u8);

    impl BitOr for Tags {
        type Output = Tags;

        fn bitor(self, rhs: Tags) -> Tags {
            Tags(self.0 | rhs.0)
        }
    }

    impl FromStr for Tags {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, ()> {
            match s {
                "A" => Ok(Tags(1)),
                "B" => Ok(Tags(2)),
                _ => Err(()),
            }
        }
    }

    #[test]
    fn numbers_and_checkbox() {
        assert_eq!(get_float(&props(json!({ "number": 1.5 })), "key", 0.0), 1.5);
        assert_eq!(get_float(&Map::new(), "missing", 2.0), 2.0);
        assert_eq!(get_int(&props(json!({ "number": 3 })), "key", 0), 3);
        assert_eq!(
            get_int(&props(json!({ "unique_id": { "prefix": null, "number": 42 } })), "key", 0),
            42
        );
        assert_eq!(get_int(&props(json!({ "number": null })), "key", 7), 7);
        assert!(get_bool(&props(json!({ "checkbox": true })), "key", false));
        assert!(get_bool(&props(json!({ "checkbox": "yes" })), "key", true));
    }

    #[test]
    fn strings_from_title_rich_text_and_select() {
        let title = props(json!({ "type": "title", "title": [{ "plain_text": "txt" }] }));
        assert_eq!(get_string(&title, "key", "def"), "txt");

        let rich = props(json!({ "type": "rich_text", "rich_text": [] }));
        assert_eq!(get_string(&rich, "key", "def"), "def");

        let select = props(json!({ "type": "select", "select": { "name": "Blue" } }));
        assert_eq!(get_string(&select, "key", "def"), "Blue");

        let number = props(json!({ "type": "number", "number": 1 }));
        assert_eq!(get_string(&number, "key", "def"), "def");
    }

    #[test]
    fn relations_from_list_or_single_object() {
        let list = props(json!({ "relation": [{ "id": "a" }, { "id": "b" }] }));
        assert_eq!(get_relations(&list, "key"), vec!["a", "b"]);

        let single = props(json!({ "relation": { "id": "c" } }));
        assert_eq!(get_relations(&single, "key"), vec!["c"]);

        assert!(get_relations(&Map::new(), "key").is_empty());
    }

    #[test]
    fn enum_ignores_spaces_and_falls_back() {
        let heavy = props(json!({ "select": { "name": "Heavy Armor" } }));
        assert_eq!(get_enum(&heavy, "key", Armor::Light), Armor::HeavyArmor);

        let unknown = props(json!({ "select": { "name": "Robe" } }));
        assert_eq!(get_enum(&unknown, "key", Armor::Light), Armor::Light);

        let empty = props(json!({ "select": null }));
        assert_eq!(get_enum(&empty, "key", Armor::HeavyArmor), Armor::HeavyArmor);
    }

    #[test]
    fn flags_combine_multi_select_options() {
        let both = props(json!({ "multi_select": [{ "name": "A" }, { "name": "B" }] }));
        assert_eq!(get_flags(&both, "key", Tags(0)), Tags(3));
        assert_eq!(get_multi_select(&both, "key"), vec!["A", "B"]);

        let none = props(json!({ "multi_select": [] }));
        assert_eq!(get_flags(&none, "key", Tags(0)), Tags(0));

        let bad = props(json!({ "multi_select": [{ "name": "A" }, { "name": "Z" }] }));
        assert_eq!(get_flags(&bad, "key", Tags(0)), Tags(0));
    }
}
