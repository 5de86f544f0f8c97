use serde_json::Value;

/// Deep-merge `user_schema` into `default_schema` and return the result.
///
/// Where both sides hold an object under the same key the merge recurses;
/// otherwise the user value replaces the default one. Neither input is
/// modified.
pub fn update_schemas(default_schema: &Value, user_schema: &Value) -> Value {
    let (Value::Object(default_map), Value::Object(user_map)) = (default_schema, user_schema)
    else {
        return user_schema.clone();
    };

    let mut merged = default_map.clone();
    for (key, user_value) in user_map {
        let value = match merged.get(key) {
            Some(default_value @ Value::Object(_)) if user_value.is_object() => {
                update_schemas(default_value, user_value)
            }
            _ => user_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_merge() {
        let default = json!({
            "materials": {
                "type": "object",
                "properties": {"band_gap": {"type": "number"}, "nsites": {"type": "integer"}}
            }
        });
        let user = json!({
            "materials": {"properties": {"band_gap": {"minimum": 0}}}
        });
        assert_eq!(
            update_schemas(&default, &user),
            json!({
                "materials": {
                    "type": "object",
                    "properties": {
                        "band_gap": {"type": "number", "minimum": 0},
                        "nsites": {"type": "integer"}
                    }
                }
            })
        );
    }

    #[test]
    fn test_non_mapping_is_replaced() {
        let default = json!({"required": ["_id"], "type": "object"});
        let user = json!({"required": ["_id", "name"], "type": {"nested": true}});
        assert_eq!(update_schemas(&default, &user), user);
    }

    #[test]
    fn test_inputs_untouched() {
        let default = json!({"a": {"b": 1}});
        let user = json!({"a": {"c": 2}, "d": 3});
        let before = (default.clone(), user.clone());
        let merged = update_schemas(&default, &user);
        assert_eq!((default, user), before);
        assert_eq!(merged, json!({"a": {"b": 1, "c": 2}, "d": 3}));
    }

    #[test]
    fn test_empty_user_schema() {
        let default = json!({"a": 1});
        assert_eq!(update_schemas(&default, &json!({})), default);
    }
}
